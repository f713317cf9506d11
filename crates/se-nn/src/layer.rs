// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! One affine-plus-activation stage of a network.

use se_tensor::{Matrix, TensorResult};

use crate::activation::Activation;
use crate::rng;

/// A dense layer: `output = activation(weights · input + biases)`.
///
/// `weights` is `out x in`, `biases` and `output` are `out x 1`. The output
/// column doubles as the payload handed to the next layer, so a forward pass
/// allocates nothing.
pub struct Layer {
    pub weights: Matrix,
    pub biases: Matrix,
    pub output: Matrix,
    pub activation: Activation,
}

impl Layer {
    pub fn new(n_inputs: usize, n_outputs: usize, activation: Activation) -> TensorResult<Self> {
        Ok(Self {
            weights: Matrix::new(n_outputs, n_inputs)?,
            biases: Matrix::new(n_outputs, 1)?,
            output: Matrix::new(n_outputs, 1)?,
            activation,
        })
    }

    /// Number of inputs the layer consumes.
    pub fn inputs(&self) -> usize {
        self.weights.cols()
    }

    /// Number of units, i.e. the height of the output column.
    pub fn outputs(&self) -> usize {
        self.weights.rows()
    }

    /// Fills weights and biases with IID draws from U[-1, 1].
    pub fn randomize(&mut self) {
        se_tensor::matrix::map(&mut self.weights, |_| rng::uniform_signed());
        se_tensor::matrix::map(&mut self.biases, |_| rng::uniform_signed());
    }

    /// Applies the activation to the layer's own output column.
    pub fn activate(&mut self) {
        self.activation.apply(&mut self.output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_follow_the_unit_counts() {
        let layer = Layer::new(3, 2, Activation::Sigmoid).unwrap();
        assert_eq!(layer.weights.shape(), (2, 3));
        assert_eq!(layer.biases.shape(), (2, 1));
        assert_eq!(layer.output.shape(), (2, 1));
        assert_eq!(layer.inputs(), 3);
        assert_eq!(layer.outputs(), 2);
    }

    #[test]
    fn randomize_stays_in_range() {
        rng::reseed(11);
        let mut layer = Layer::new(8, 8, Activation::Sigmoid).unwrap();
        layer.randomize();
        assert!(layer
            .weights
            .as_slice()
            .iter()
            .chain(layer.biases.as_slice())
            .all(|v| (-1.0..=1.0).contains(v)));
        // A 64-weight layer drawing all zeros would mean a broken generator.
        assert!(layer.weights.as_slice().iter().any(|&v| v != 0.0));
    }
}
