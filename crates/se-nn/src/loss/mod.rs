// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Scalar losses scored against a network's final output column.

mod mean_square_error;
mod softmax_cross_entropy;

use se_tensor::Matrix;

/// Loss used to score a prediction against its target. Lower is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loss {
    MeanSquareError,
    SoftmaxCrossEntropy,
}

impl Loss {
    /// Scores `output` against `target`. Shapes must match.
    pub fn compute(self, output: &Matrix, target: &Matrix) -> f32 {
        match self {
            Loss::MeanSquareError => mean_square_error::compute(output, target),
            Loss::SoftmaxCrossEntropy => softmax_cross_entropy::compute(output, target),
        }
    }

    /// Scores with a caller-owned error buffer shaped like `target`.
    ///
    /// Evaluation workers pre-allocate the buffer once and reuse it for every
    /// task; the mean-square path materialises the residual there, the
    /// cross-entropy path folds directly and leaves it untouched. The result
    /// is identical to [`Loss::compute`].
    pub fn compute_buffered(self, output: &Matrix, target: &Matrix, error: &mut Matrix) -> f32 {
        match self {
            Loss::MeanSquareError => mean_square_error::compute_buffered(output, target, error),
            Loss::SoftmaxCrossEntropy => softmax_cross_entropy::compute(output, target),
        }
    }
}
