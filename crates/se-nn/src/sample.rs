// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Labelled evaluation samples.

use se_tensor::{Matrix, TensorResult};

/// One labelled example: an `R x 1` input column and a `K x 1` target column
/// (one-hot for classification). Read-only once constructed.
#[derive(Debug)]
pub struct Sample {
    input: Matrix,
    target: Matrix,
}

impl Sample {
    /// Wraps an input/target pair, rejecting NaN or infinite values. The
    /// activations assume finite inputs and would silently wash a NaN
    /// through every score.
    pub fn new(input: Matrix, target: Matrix) -> TensorResult<Self> {
        input.validate_finite("sample input")?;
        target.validate_finite("sample target")?;
        Ok(Self { input, target })
    }

    pub fn input(&self) -> &Matrix {
        &self.input
    }

    pub fn target(&self) -> &Matrix {
        &self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_finite_input() {
        let mut input = Matrix::new(2, 1).unwrap();
        input.set(1, 0, f32::INFINITY);
        let target = Matrix::new(2, 1).unwrap();
        assert!(Sample::new(input, target).is_err());
    }

    #[test]
    fn accepts_finite_pairs() {
        let input = Matrix::new(4, 1).unwrap();
        let target = Matrix::new(2, 1).unwrap();
        assert!(Sample::new(input, target).is_ok());
    }
}
