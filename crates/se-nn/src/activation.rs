// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! In-place activations applied to a layer's output column.

use se_tensor::{matrix, Matrix};

/// Activation applied after the affine step of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Sigmoid,
    /// Exponential normalisation over the whole column.
    ///
    /// No max-subtraction is performed before exponentiating, so inputs much
    /// beyond ~88 overflow `f32::exp` and poison the normaliser. Evolution
    /// keeps weights in [-1, 1], which keeps pre-activations far from that
    /// cliff for any sanely scaled input.
    Softmax,
}

impl Activation {
    /// Transforms `values` in place.
    pub fn apply(self, values: &mut Matrix) {
        match self {
            Activation::Sigmoid => sigmoid(values),
            Activation::Softmax => softmax(values),
        }
    }
}

fn sigmoid(values: &mut Matrix) {
    matrix::map(values, |v| 1.0 / (1.0 + (-v).exp()));
}

fn softmax(values: &mut Matrix) {
    matrix::map(values, f32::exp);
    let total = matrix::sum(values, 0.0);
    matrix::map(values, |v| v / total);
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

    #[test]
    fn sigmoid_saturates_at_the_extremes() {
        let mut m = column(&[0.0, -1e9, 1e9]);
        Activation::Sigmoid.apply(&mut m);
        assert_eq!(m.get(0, 0), 0.5);
        assert!(m.get(1, 0) < 1e-6);
        assert!(m.get(2, 0) > 1.0 - 1e-6);
    }

    #[test]
    fn sigmoid_output_stays_in_the_open_interval() {
        let mut m = column(&[-5.0, -0.3, 0.0, 0.7, 5.0]);
        Activation::Sigmoid.apply(&mut m);
        assert!(m.as_slice().iter().all(|&v| v > 0.0 && v < 1.0));
    }

    #[test]
    fn softmax_of_a_constant_column_is_uniform() {
        let mut m = column(&[1.0, 1.0, 1.0]);
        Activation::Softmax.apply(&mut m);
        for &v in m.as_slice() {
            assert!((v - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn softmax_is_a_probability_distribution() {
        let mut m = column(&[0.2, -1.5, 3.0, 0.0]);
        Activation::Softmax.apply(&mut m);
        assert!(m.as_slice().iter().all(|&v| v >= 0.0));
        let total: f32 = m.as_slice().iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }
}
