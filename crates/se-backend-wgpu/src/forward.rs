// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Population forward pass on the device.
//!
//! One compute invocation handles one (subject, sample) task end to end:
//! it walks the subject's layer stack out of a packed parameter buffer,
//! ping-pongs activations through a per-task scratch window, and writes the
//! sample's loss into a score buffer that is copied back and reduced to
//! per-subject means on the host. Unlike the CPU evaluator, the device path
//! enumerates every provided sample per subject: the driver draws the
//! mini-batch, the kernel scores it exhaustively.

use bytemuck::{cast_slice, Pod, Zeroable};
use tracing::debug;

use se_nn::{Activation, Loss, Network, Population, Sample};

use crate::buffers::BufferId;
use crate::commands::copy_buffer_to_buffer;
use crate::device::GpuDevice;
use crate::pipeline::{storage_entry, uniform_entry};
use crate::GpuError;

const WORKGROUP_SIZE: u32 = 64;
/// u32 words per layer in the packed topology table:
/// inputs, outputs, weight offset, bias offset, activation.
const TOPOLOGY_STRIDE: usize = 5;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ParamsPod {
    n_subjects: u32,
    n_samples: u32,
    n_layers: u32,
    input_dim: u32,
    max_units: u32,
    loss_kind: u32,
    subject_stride: u32,
    _pad: u32,
}

fn activation_code(activation: Activation) -> u32 {
    match activation {
        Activation::Sigmoid => 0,
        Activation::Softmax => 1,
    }
}

fn loss_code(loss: Loss) -> u32 {
    match loss {
        Loss::MeanSquareError => 0,
        Loss::SoftmaxCrossEntropy => 1,
    }
}

/// Packs the layer table: per layer (inputs, outputs, weight offset, bias
/// offset, activation), offsets in elements relative to a subject's block.
/// Returns the table, the per-subject element stride, and the widest column
/// the scratch windows must hold.
fn pack_topology(network: &Network) -> (Vec<u32>, u32, u32) {
    let mut table = Vec::with_capacity(network.layers().len() * TOPOLOGY_STRIDE);
    let mut offset = 0u32;
    let mut max_units = network.inputs() as u32;
    for layer in network.layers() {
        let inputs = layer.inputs() as u32;
        let outputs = layer.outputs() as u32;
        table.extend_from_slice(&[
            inputs,
            outputs,
            offset,
            offset + inputs * outputs,
            activation_code(layer.activation),
        ]);
        offset += inputs * outputs + outputs;
        max_units = max_units.max(outputs);
    }
    (table, offset, max_units)
}

/// Flattens every subject's parameters, weights then biases per layer,
/// subjects back to back.
fn pack_population(population: &Population) -> Vec<f32> {
    let mut data = Vec::new();
    for subject in population.subjects() {
        for layer in subject.network.layers() {
            data.extend_from_slice(layer.weights.as_slice());
            data.extend_from_slice(layer.biases.as_slice());
        }
    }
    data
}

fn pack_inputs(samples: &[Sample]) -> Vec<f32> {
    let mut data = Vec::new();
    for sample in samples {
        data.extend_from_slice(sample.input().as_slice());
    }
    data
}

fn pack_targets(samples: &[Sample]) -> Vec<f32> {
    let mut data = Vec::new();
    for sample in samples {
        data.extend_from_slice(sample.target().as_slice());
    }
    data
}

/// Per-subject mean over subject-major per-task scores.
fn reduce_scores(scores: &[f32], n_subjects: usize, n_samples: usize) -> Vec<f64> {
    let mut means = Vec::with_capacity(n_subjects);
    for subject in 0..n_subjects {
        let window = &scores[subject * n_samples..(subject + 1) * n_samples];
        let total: f64 = window.iter().map(|&s| f64::from(s)).sum();
        means.push(total / n_samples as f64);
    }
    means
}

/// A pipeline plus the pool buffers sized for one population/batch shape.
pub struct GpuEvaluator {
    pipeline: std::sync::Arc<wgpu::ComputePipeline>,
    layout: std::sync::Arc<wgpu::BindGroupLayout>,
    population: BufferId,
    inputs: BufferId,
    targets: BufferId,
    topology: BufferId,
    scratch: BufferId,
    scores: BufferId,
    staging: BufferId,
    params: BufferId,
    n_subjects: usize,
    n_samples: usize,
    input_dim: usize,
    output_dim: usize,
}

impl GpuEvaluator {
    /// Builds the pipeline and carves every buffer for evaluating
    /// `n_subjects` networks of `network`'s topology against batches of
    /// `n_samples` samples. The topology and dispatch parameters are
    /// uploaded once here; only parameters and samples move per call.
    pub fn new(
        gpu: &mut GpuDevice,
        network: &Network,
        n_subjects: usize,
        n_samples: usize,
    ) -> Result<Self, GpuError> {
        let (table, subject_stride, max_units) = pack_topology(network);
        let n_layers = network.layers().len();
        let input_dim = network.inputs();
        let output_dim = network.outputs();
        let tasks = (n_subjects * n_samples) as u64;

        let (pipeline, layout) = gpu.create_compute_pipeline(
            "feed_forward.wgsl",
            "se.gpu.feed_forward",
            "main",
            &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, false),
                storage_entry(5, false),
                uniform_entry(6),
            ],
        )?;

        let upload = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let population = gpu.create_buffer(
            "se.gpu.population",
            u64::from(subject_stride) * n_subjects as u64 * 4,
            upload,
        )?;
        let inputs = gpu.create_buffer(
            "se.gpu.sample_inputs",
            (n_samples * input_dim) as u64 * 4,
            upload,
        )?;
        let targets = gpu.create_buffer(
            "se.gpu.sample_targets",
            (n_samples * output_dim) as u64 * 4,
            upload,
        )?;
        let topology = gpu.create_buffer(
            "se.gpu.topology",
            (table.len() * 4) as u64,
            upload,
        )?;
        let scratch = gpu.create_buffer(
            "se.gpu.scratch",
            tasks * u64::from(max_units) * 2 * 4,
            wgpu::BufferUsages::STORAGE,
        )?;
        let scores = gpu.create_buffer(
            "se.gpu.scores",
            tasks * 4,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        )?;
        let staging = gpu.create_buffer(
            "se.gpu.scores.staging",
            tasks * 4,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        )?;
        let params = gpu.create_buffer(
            "se.gpu.params",
            std::mem::size_of::<ParamsPod>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )?;

        gpu.write_buffer(topology, cast_slice(&table))?;
        let pod = ParamsPod {
            n_subjects: n_subjects as u32,
            n_samples: n_samples as u32,
            n_layers: n_layers as u32,
            input_dim: input_dim as u32,
            max_units,
            loss_kind: loss_code(network.loss()),
            subject_stride,
            _pad: 0,
        };
        gpu.write_buffer(params, cast_slice(&[pod]))?;

        debug!(
            n_subjects,
            n_samples,
            n_layers,
            subject_stride,
            max_units,
            "gpu evaluator ready"
        );

        Ok(Self {
            pipeline,
            layout,
            population,
            inputs,
            targets,
            topology,
            scratch,
            scores,
            staging,
            params,
            n_subjects,
            n_samples,
            input_dim,
            output_dim,
        })
    }

    /// Scores every subject against every provided sample and returns
    /// per-subject mean losses, in subject order.
    pub fn evaluate(
        &self,
        gpu: &GpuDevice,
        population: &Population,
        samples: &[Sample],
    ) -> Result<Vec<f64>, GpuError> {
        if population.len() != self.n_subjects {
            return Err(GpuError::CapacityMismatch {
                what: "subjects",
                expected: self.n_subjects,
                got: population.len(),
            });
        }
        if samples.len() != self.n_samples {
            return Err(GpuError::CapacityMismatch {
                what: "samples",
                expected: self.n_samples,
                got: samples.len(),
            });
        }
        for sample in samples {
            if sample.input().len() != self.input_dim {
                return Err(GpuError::CapacityMismatch {
                    what: "input elements",
                    expected: self.input_dim,
                    got: sample.input().len(),
                });
            }
            if sample.target().len() != self.output_dim {
                return Err(GpuError::CapacityMismatch {
                    what: "target elements",
                    expected: self.output_dim,
                    got: sample.target().len(),
                });
            }
        }

        gpu.write_buffer(self.population, cast_slice(&pack_population(population)))?;
        gpu.write_buffer(self.inputs, cast_slice(&pack_inputs(samples)))?;
        gpu.write_buffer(self.targets, cast_slice(&pack_targets(samples)))?;

        let bind_group = gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("se.gpu.feed_forward.bind_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: gpu.buffer(self.population)?.resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: gpu.buffer(self.inputs)?.resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: gpu.buffer(self.targets)?.resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: gpu.buffer(self.topology)?.resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: gpu.buffer(self.scratch)?.resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: gpu.buffer(self.scores)?.resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: gpu.buffer(self.params)?.resource(),
                },
            ],
        });

        let tasks = (self.n_subjects * self.n_samples) as u32;
        let scores_buffer = gpu.buffer(self.scores)?;
        let staging_buffer = gpu.buffer(self.staging)?;
        gpu.immediate(|encoder| {
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("se.gpu.feed_forward.pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(tasks.div_ceil(WORKGROUP_SIZE).max(1), 1, 1);
            }
            copy_buffer_to_buffer(encoder, scores_buffer, staging_buffer, u64::from(tasks) * 4);
        });

        let raw = gpu.read_buffer(self.staging)?;
        let scores: &[f32] = cast_slice(&raw);
        Ok(reduce_scores(scores, self.n_subjects, self.n_samples))
    }

    /// Releases every buffer this evaluator carved.
    pub fn destroy(self, gpu: &mut GpuDevice) -> Result<(), GpuError> {
        for id in [
            self.population,
            self.inputs,
            self.targets,
            self.topology,
            self.scratch,
            self.scores,
            self.staging,
            self.params,
        ] {
            gpu.destroy_buffer(id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use se_nn::{rng, LayerSpec};
    use se_tensor::Matrix;

    fn network() -> Network {
        rng::reseed(71);
        Network::new(
            3,
            &[
                LayerSpec::new(4, Activation::Sigmoid),
                LayerSpec::new(2, Activation::Softmax),
            ],
            Loss::SoftmaxCrossEntropy,
        )
        .unwrap()
    }

    #[test]
    fn topology_offsets_chain_through_the_stack() {
        let network = network();
        let (table, stride, max_units) = pack_topology(&network);
        assert_eq!(table.len(), 2 * TOPOLOGY_STRIDE);
        // Layer 0: 3 -> 4, weights at 0, biases after 12 weights.
        assert_eq!(&table[0..5], &[3, 4, 0, 12, 0]);
        // Layer 1: 4 -> 2, offset past layer 0's 16 parameters.
        assert_eq!(&table[5..10], &[4, 2, 16, 24, 1]);
        assert_eq!(stride, 16 + 10);
        assert_eq!(max_units, 4);
    }

    #[test]
    fn population_packs_weights_then_biases_per_subject() {
        rng::reseed(73);
        let population = Population::new(
            2,
            2,
            &[LayerSpec::new(1, Activation::Sigmoid)],
            Loss::MeanSquareError,
        )
        .unwrap();
        let packed = pack_population(&population);
        // Two subjects, each 2 weights + 1 bias.
        assert_eq!(packed.len(), 6);
        let layer = &population.subjects()[1].network.layers()[0];
        assert_eq!(&packed[3..5], layer.weights.as_slice());
        assert_eq!(packed[5], layer.biases.get(0, 0));
    }

    #[test]
    fn sample_packing_is_contiguous() {
        let make = |v: f32| {
            let mut input = Matrix::new(2, 1).unwrap();
            input.set(0, 0, v);
            let mut target = Matrix::new(1, 1).unwrap();
            target.set(0, 0, 1.0);
            Sample::new(input, target).unwrap()
        };
        let samples = vec![make(0.25), make(0.5)];
        assert_eq!(pack_inputs(&samples), vec![0.25, 0.0, 0.5, 0.0]);
        assert_eq!(pack_targets(&samples), vec![1.0, 1.0]);
    }

    #[test]
    fn score_reduction_averages_per_subject() {
        let scores = [1.0f32, 3.0, 10.0, 20.0];
        let means = reduce_scores(&scores, 2, 2);
        assert_eq!(means, vec![2.0, 15.0]);
    }
}
