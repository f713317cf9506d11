// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The population: a flock of identical-topology subjects scored in parallel.
//!
//! Evaluation fans (subject, sample) tasks out over one thread per hardware
//! core. Workers claim tasks through a single atomic cursor and fold loss
//! contributions into per-subject accumulators with lock-free f64 adds, so
//! scheduling stays oblivious to which subject a task belongs to. All worker
//! scratch is carved from the arena on the controller thread before any
//! worker starts; nothing allocates inside the pool.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;

use se_tensor::{Matrix, TensorResult};
use tracing::debug;

use crate::loss::Loss;
use crate::network::{ForwardScratch, LayerSpec, Network};
use crate::rng;
use crate::sample::Sample;

const DEFAULT_MIN_MUTATION_RATE: f64 = 0.1;
const DEFAULT_MAX_MUTATION_RATE: f64 = 0.5;

/// One candidate network and its accumulated score (lower is better).
pub struct Subject {
    pub network: Network,
    pub score: f64,
}

/// Score spread across the population after an evaluation pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// A fixed-length flock of subjects sharing one topology.
pub struct Population {
    subjects: Vec<Subject>,
    min_mutation_rate: f64,
    max_mutation_rate: f64,
}

struct Task {
    subject: usize,
    sample: usize,
}

struct WorkerScratch {
    forward: ForwardScratch,
    error: Matrix,
}

/// Lock-free `cell += value` for f64 bits.
fn atomic_add(cell: &AtomicU64, value: f64) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let next = (f64::from_bits(current) + value).to_bits();
        match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

/// Better (lower) scores earn less mutation. Scores are clamped to [0, 1]
/// for rate derivation only; callers scoring with unbounded losses should
/// normalise before relying on the spread.
fn mutation_rate(min_rate: f64, max_rate: f64, score: f64) -> f64 {
    min_rate + (max_rate - min_rate) * (1.0 - score.clamp(0.0, 1.0))
}

impl Population {
    /// Builds `n` independently randomized subjects of the given topology.
    pub fn new(n: usize, n_inputs: usize, specs: &[LayerSpec], loss: Loss) -> TensorResult<Self> {
        let mut subjects = Vec::with_capacity(n);
        for _ in 0..n {
            subjects.push(Subject {
                network: Network::new(n_inputs, specs, loss)?,
                score: 0.0,
            });
        }
        Ok(Self {
            subjects,
            min_mutation_rate: DEFAULT_MIN_MUTATION_RATE,
            max_mutation_rate: DEFAULT_MAX_MUTATION_RATE,
        })
    }

    /// Overrides the mutation-rate window used by [`Population::next_generation`].
    pub fn with_mutation_rates(mut self, min_rate: f64, max_rate: f64) -> Self {
        self.min_mutation_rate = min_rate;
        self.max_mutation_rate = max_rate;
        self
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn subjects_mut(&mut self) -> &mut [Subject] {
        &mut self.subjects
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Evaluates every subject against `samples.len()` randomly chosen
    /// samples (uniform, with replacement) and stores the mean loss in each
    /// subject's score.
    ///
    /// Callers that need every sample seen exactly once per subject should
    /// pre-shuffle and dedupe externally; the contract here is sampling, not
    /// enumeration.
    pub fn feed_forward(&mut self, samples: &[Sample]) -> TensorResult<()> {
        for subject in &mut self.subjects {
            subject.score = 0.0;
        }
        if samples.is_empty() || self.subjects.is_empty() {
            return Ok(());
        }

        let mut tasks = Vec::with_capacity(self.subjects.len() * samples.len());
        for subject in 0..self.subjects.len() {
            for _ in 0..samples.len() {
                tasks.push(Task {
                    subject,
                    sample: rng::sample_index(samples.len()),
                });
            }
        }

        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(tasks.len());

        // Scratch for every worker is carved up front; the arena is not
        // touched again until the pool has joined.
        let (target_rows, target_cols) = samples[0].target().shape();
        let mut scratches = Vec::with_capacity(workers);
        for _ in 0..workers {
            scratches.push(WorkerScratch {
                forward: self.subjects[0].network.scratch()?,
                error: Matrix::new(target_rows, target_cols)?,
            });
        }

        let accumulators: Vec<AtomicU64> = (0..self.subjects.len())
            .map(|_| AtomicU64::new(0f64.to_bits()))
            .collect();
        let cursor = AtomicUsize::new(0);

        debug!(
            workers,
            tasks = tasks.len(),
            subjects = self.subjects.len(),
            samples = samples.len(),
            "evaluating population"
        );

        {
            let subjects = &self.subjects;
            let tasks = &tasks;
            let cursor = &cursor;
            let accumulators = &accumulators;

            thread::scope(|scope| {
                for scratch in scratches.iter_mut() {
                    scope.spawn(move || loop {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(task) = tasks.get(index) else {
                            break;
                        };
                        let subject = &subjects[task.subject];
                        let sample = &samples[task.sample];

                        let prediction = subject
                            .network
                            .feed_forward_buffered(sample.input(), &mut scratch.forward);
                        let loss = subject.network.loss().compute_buffered(
                            prediction,
                            sample.target(),
                            &mut scratch.error,
                        );
                        atomic_add(&accumulators[task.subject], f64::from(loss));
                    });
                }
            });
        }

        let denominator = samples.len() as f64;
        for (subject, accumulator) in self.subjects.iter_mut().zip(accumulators) {
            subject.score = f64::from_bits(accumulator.into_inner()) / denominator;
        }
        Ok(())
    }

    /// Overwrites subject scores with externally computed means. The GPU
    /// offload path feeds its results back through here.
    pub fn assign_scores(&mut self, scores: &[f64]) {
        debug_assert_eq!(scores.len(), self.subjects.len());
        for (subject, &score) in self.subjects.iter_mut().zip(scores) {
            subject.score = score;
        }
    }

    /// Score spread after the latest evaluation pass.
    pub fn compute_statistics(&self) -> Statistics {
        if self.subjects.is_empty() {
            return Statistics {
                min: 0.0,
                max: 0.0,
                avg: 0.0,
            };
        }

        let mut stats = Statistics {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            avg: 0.0,
        };
        for subject in &self.subjects {
            stats.min = stats.min.min(subject.score);
            stats.max = stats.max.max(subject.score);
            stats.avg += subject.score;
        }
        stats.avg /= self.subjects.len() as f64;
        stats
    }

    /// Mutates every subject in place with a rate derived from its score.
    /// Mutation-only evolution: there is no selection and no crossover.
    pub fn next_generation(&mut self) {
        let (min_rate, max_rate) = (self.min_mutation_rate, self.max_mutation_rate);
        for subject in &mut self.subjects {
            subject
                .network
                .mutate(mutation_rate(min_rate, max_rate, subject.score));
        }
    }
}
