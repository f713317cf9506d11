// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! MNIST driver: evolve a population of classifiers for a few generations.
//!
//! Each generation scores every subject on a mini-batch of training samples
//! (in parallel on the CPU, or on the device with the `gpu` feature), logs
//! the score spread, and mutates the population in place. Exit code 0 on
//! success, nonzero on any unhandled error.

mod mnist;

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use se_nn::{Activation, LayerSpec, Loss, Population};

const GENERATIONS: usize = 10;

#[cfg(feature = "gpu")]
const SHADER_DIR: &str = "crates/se-backend-wgpu/shaders";

struct Options {
    n_samples: usize,
    n_subjects: usize,
    n_inputs: usize,
    n_hidden: usize,
    n_outputs: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            n_samples: 2,
            n_subjects: 1,
            n_inputs: 28 * 28,
            n_hidden: 28 * 28,
            n_outputs: 10,
        }
    }
}

fn parse_arguments(args: &[String]) -> Options {
    let mut options = Options::default();
    let mut iter = args.iter().skip(1);
    while let Some(flag) = iter.next() {
        let target = match flag.as_str() {
            "--nSamples" => &mut options.n_samples,
            "--nSubjects" => &mut options.n_subjects,
            "--nHidden" => &mut options.n_hidden,
            _ => continue,
        };
        if let Some(value) = iter.next().and_then(|v| v.parse().ok()) {
            *target = value;
        }
    }
    options
}

static TRACING: OnceLock<()> = OnceLock::new();

fn init_tracing() {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    });
}

/// `1h 2m 3.45s` style rendering, dropping units that are zero.
fn duration_string(duration: Duration) -> String {
    let mut seconds = duration.as_secs_f64();
    let hours = (seconds / 3600.0) as u64;
    seconds -= hours as f64 * 3600.0;
    let minutes = (seconds / 60.0) as u64;
    seconds -= minutes as f64 * 60.0;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h "));
    }
    if minutes > 0 || hours > 0 {
        out.push_str(&format!("{minutes}m "));
    }
    out.push_str(&format!("{seconds:.2}s"));
    out
}

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_arguments(&args);

    let training = mnist::read_samples("MNIST/train").context("loading training samples")?;
    let test = mnist::read_samples("MNIST/t10k").context("loading test samples")?;
    info!(
        training = training.len(),
        test = test.len(),
        "MNIST loaded"
    );

    let batch: Vec<_> = training
        .into_iter()
        .take(options.n_samples.max(1))
        .collect();

    let mut population = Population::new(
        options.n_subjects,
        options.n_inputs,
        &[
            LayerSpec::new(options.n_hidden, Activation::Sigmoid),
            LayerSpec::new(options.n_outputs, Activation::Softmax),
        ],
        Loss::SoftmaxCrossEntropy,
    )?;

    #[cfg(feature = "gpu")]
    let (gpu, evaluator) = {
        let mut gpu = se_backend_wgpu::GpuDevice::new(SHADER_DIR)?;
        let evaluator = se_backend_wgpu::GpuEvaluator::new(
            &mut gpu,
            &population.subjects()[0].network,
            population.len(),
            batch.len(),
        )?;
        (gpu, evaluator)
    };

    for generation in 0..GENERATIONS {
        let started = Instant::now();

        #[cfg(not(feature = "gpu"))]
        population.feed_forward(&batch)?;

        #[cfg(feature = "gpu")]
        {
            let scores = evaluator.evaluate(&gpu, &population, &batch)?;
            population.assign_scores(&scores);
        }

        let elapsed = started.elapsed();
        let stats = population.compute_statistics();
        info!(
            generation,
            duration = %duration_string(elapsed),
            min = stats.min,
            avg = stats.avg,
            max = stats.max,
            "generation evaluated"
        );

        population.next_generation();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("se-mnist")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_match_the_classic_topology() {
        let options = parse_arguments(&args(&[]));
        assert_eq!(options.n_samples, 2);
        assert_eq!(options.n_subjects, 1);
        assert_eq!(options.n_inputs, 784);
        assert_eq!(options.n_hidden, 784);
        assert_eq!(options.n_outputs, 10);
    }

    #[test]
    fn flags_override_defaults_and_junk_is_ignored() {
        let options = parse_arguments(&args(&[
            "--nSamples", "64", "--bogus", "--nSubjects", "32", "--nHidden", "not-a-number",
        ]));
        assert_eq!(options.n_samples, 64);
        assert_eq!(options.n_subjects, 32);
        assert_eq!(options.n_hidden, 784);
    }

    #[test]
    fn durations_render_like_stopwatches() {
        assert_eq!(duration_string(Duration::from_secs_f64(2.5)), "2.50s");
        assert_eq!(duration_string(Duration::from_secs(125)), "2m 5.00s");
        assert_eq!(duration_string(Duration::from_secs(3725)), "1h 2m 5.00s");
    }
}
