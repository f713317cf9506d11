// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! A fixed-topology stack of layers with forward propagation and mutation.

use se_tensor::{matrix, Matrix, TensorError, TensorResult};
use tracing::trace;

use crate::activation::Activation;
use crate::layer::Layer;
use crate::loss::Loss;
use crate::rng;

/// One entry of a topology description: unit count plus activation.
#[derive(Clone, Copy, Debug)]
pub struct LayerSpec {
    pub units: usize,
    pub activation: Activation,
}

impl LayerSpec {
    pub fn new(units: usize, activation: Activation) -> Self {
        Self { units, activation }
    }
}

/// Per-evaluator output columns for a lock-free shared forward pass.
///
/// Workers evaluating the same network concurrently must not write the
/// network's own layer outputs, so each worker carries one of these, built
/// once (on the controller thread, before the pool starts) and reused for
/// every task.
pub struct ForwardScratch {
    outputs: Vec<Matrix>,
}

/// An ordered stack of [`Layer`]s scored by a [`Loss`].
///
/// Dimension chaining is enforced at construction: layer `i + 1` consumes
/// exactly the units layer `i` produces. Networks are born randomized.
pub struct Network {
    layers: Vec<Layer>,
    loss: Loss,
}

impl Network {
    /// Builds and randomizes a network. The first layer reads `n_inputs`
    /// values; every spec entry adds one layer.
    pub fn new(n_inputs: usize, specs: &[LayerSpec], loss: Loss) -> TensorResult<Self> {
        if n_inputs == 0 || specs.is_empty() {
            return Err(TensorError::InvalidDimensions {
                rows: n_inputs,
                cols: specs.len(),
            });
        }

        let mut layers = Vec::with_capacity(specs.len());
        let mut inputs = n_inputs;
        for spec in specs {
            if spec.units == 0 {
                return Err(TensorError::InvalidDimensions {
                    rows: inputs,
                    cols: 0,
                });
            }
            layers.push(Layer::new(inputs, spec.units, spec.activation)?);
            inputs = spec.units;
        }

        let mut network = Self { layers, loss };
        network.randomize();
        Ok(network)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    /// Dimensionality of the input column the network expects.
    pub fn inputs(&self) -> usize {
        self.layers[0].inputs()
    }

    /// Dimensionality of the prediction column.
    pub fn outputs(&self) -> usize {
        self.layers[self.layers.len() - 1].outputs()
    }

    /// Redraws every weight and bias from U[-1, 1].
    pub fn randomize(&mut self) {
        for layer in &mut self.layers {
            layer.randomize();
        }
    }

    /// Runs the input through the stack, layer by layer, storing each
    /// activation in the layer's own output column. Afterwards
    /// [`Network::output`] holds the prediction.
    pub fn feed_forward(&mut self, input: &Matrix) {
        for i in 0..self.layers.len() {
            let (prev, rest) = self.layers.split_at_mut(i);
            let layer = &mut rest[0];
            let payload = if i == 0 { input } else { &prev[i - 1].output };

            matrix::dot(&layer.weights, payload, &mut layer.output);
            matrix::add_inplace(&mut layer.output, &layer.biases);
            layer.activate();
        }
    }

    /// The final layer's output column, i.e. the latest prediction.
    pub fn output(&self) -> &Matrix {
        &self.layers[self.layers.len() - 1].output
    }

    /// Builds scratch output columns matching this topology.
    pub fn scratch(&self) -> TensorResult<ForwardScratch> {
        let mut outputs = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            outputs.push(Matrix::new(layer.outputs(), 1)?);
        }
        Ok(ForwardScratch { outputs })
    }

    /// Forward pass that leaves the network untouched, writing every
    /// activation into `scratch` instead. Returns the prediction column.
    pub fn feed_forward_buffered<'s>(
        &self,
        input: &Matrix,
        scratch: &'s mut ForwardScratch,
    ) -> &'s Matrix {
        debug_assert_eq!(scratch.outputs.len(), self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            let (prev, rest) = scratch.outputs.split_at_mut(i);
            let out = &mut rest[0];
            let payload = if i == 0 { input } else { &prev[i - 1] };

            matrix::dot(&layer.weights, payload, out);
            matrix::add_inplace(out, &layer.biases);
            layer.activation.apply(out);
        }
        &scratch.outputs[self.layers.len() - 1]
    }

    /// Scores the current prediction against `target`.
    pub fn compute_loss(&self, target: &Matrix) -> f32 {
        self.loss.compute(self.output(), target)
    }

    /// Replaces each weight and bias with a fresh U[-1, 1] draw with
    /// probability `rate`. Runs on the controller thread only; the draws
    /// come from the process-wide generator.
    pub fn mutate(&mut self, rate: f64) {
        if rate <= 0.0 {
            return;
        }

        let mut mutated = 0usize;
        let mut total = 0usize;
        for layer in &mut self.layers {
            for values in [&mut layer.weights, &mut layer.biases] {
                matrix::map(values, |v| {
                    if rng::uniform_unit() <= rate {
                        mutated += 1;
                        rng::uniform_signed()
                    } else {
                        v
                    }
                });
                total += values.len();
            }
        }
        trace!(mutated, total, rate, "network mutated");
    }

    /// Reserved. Evolution searches the weight space directly; no gradient
    /// path exists yet.
    pub fn back_propagation(&mut self, _input: &Matrix, _target: &Matrix) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f32]) -> Matrix {
        let mut m = Matrix::new(values.len(), 1).unwrap();
        for (i, &v) in values.iter().enumerate() {
            m.set(i, 0, v);
        }
        m
    }

    fn two_layer() -> Network {
        Network::new(
            2,
            &[
                LayerSpec::new(2, Activation::Sigmoid),
                LayerSpec::new(2, Activation::Softmax),
            ],
            Loss::MeanSquareError,
        )
        .unwrap()
    }

    fn zero_parameters(network: &mut Network) {
        for layer in network.layers_mut() {
            matrix::map(&mut layer.weights, |_| 0.0);
            matrix::map(&mut layer.biases, |_| 0.0);
        }
    }

    fn parameters(network: &Network) -> Vec<f32> {
        network
            .layers()
            .iter()
            .flat_map(|l| {
                l.weights
                    .as_slice()
                    .iter()
                    .chain(l.biases.as_slice())
                    .copied()
            })
            .collect()
    }

    #[test]
    fn dimensions_chain_through_the_stack() {
        let network = Network::new(
            4,
            &[
                LayerSpec::new(3, Activation::Sigmoid),
                LayerSpec::new(2, Activation::Softmax),
            ],
            Loss::SoftmaxCrossEntropy,
        )
        .unwrap();
        assert_eq!(network.inputs(), 4);
        assert_eq!(network.outputs(), 2);
        assert_eq!(network.layers()[0].weights.shape(), (3, 4));
        assert_eq!(network.layers()[1].weights.shape(), (2, 3));
    }

    #[test]
    fn empty_topologies_are_rejected() {
        assert!(Network::new(4, &[], Loss::MeanSquareError).is_err());
        assert!(Network::new(0, &[LayerSpec::new(2, Activation::Sigmoid)], Loss::MeanSquareError)
            .is_err());
    }

    #[test]
    fn zeroed_network_predicts_the_fixed_point() {
        // Sigmoid of 0 is 0.5; softmax of a constant pair is uniform.
        let mut network = two_layer();
        zero_parameters(&mut network);
        network.feed_forward(&column(&[0.3, -0.8]));
        let out = network.output();
        assert!((out.get(0, 0) - 0.5).abs() < 1e-6);
        assert!((out.get(1, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn forward_is_deterministic() {
        rng::reseed(3);
        let mut network = two_layer();
        let input = column(&[0.25, 0.75]);
        network.feed_forward(&input);
        let first = network.output().try_clone().unwrap();
        network.feed_forward(&input);
        assert_eq!(network.output(), &first);
    }

    #[test]
    fn buffered_forward_matches_in_place() {
        rng::reseed(5);
        let mut network = two_layer();
        let input = column(&[0.1, 0.9]);
        let mut scratch = network.scratch().unwrap();

        let buffered = network
            .feed_forward_buffered(&input, &mut scratch)
            .try_clone()
            .unwrap();
        network.feed_forward(&input);
        assert_eq!(network.output(), &buffered);
    }

    #[test]
    fn mutate_zero_is_a_no_op() {
        rng::reseed(13);
        let mut network = two_layer();
        let before = parameters(&network);
        network.mutate(0.0);
        assert_eq!(parameters(&network), before);
    }

    #[test]
    fn mutate_one_replaces_everything() {
        rng::reseed(17);
        let mut network = two_layer();
        let before = parameters(&network);
        network.mutate(1.0);
        let after = parameters(&network);
        let changed = before
            .iter()
            .zip(&after)
            .filter(|(b, a)| b != a)
            .count();
        // Every parameter is redrawn; the odds of any draw colliding with
        // the value it replaces are ~2^-24 per parameter.
        assert_eq!(changed, before.len());
    }

    #[test]
    fn loss_uses_the_latest_prediction() {
        let mut network = two_layer();
        zero_parameters(&mut network);
        network.feed_forward(&column(&[0.0, 0.0]));
        let target = column(&[0.5, 0.5]);
        assert!(network.compute_loss(&target).abs() < 1e-9);
    }
}
