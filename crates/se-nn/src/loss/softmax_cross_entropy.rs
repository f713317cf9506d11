// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use se_tensor::{matrix, Matrix};

/// Floor for the log argument; keeps one-hot targets out of `ln(0)`.
const EPSILON: f32 = 1e-9;

/// `-Σ o · ln(max(t, ε))`.
///
/// The target, not the prediction, goes through the logarithm. Against a
/// one-hot target the correct class contributes nothing (`ln 1 = 0`) and the
/// score is `-ln ε` times the probability mass parked on wrong classes, so
/// it still falls monotonically as mass moves onto the right answer.
pub(super) fn compute(output: &Matrix, target: &Matrix) -> f32 {
    let mut acc = 0.0f32;
    matrix::map2(output, target, |o, t| {
        acc += o * t.max(EPSILON).ln();
    });
    -acc
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
    fn one_hot_target_weighs_the_misplaced_mass() {
        let output = column(&[0.7, 0.2, 0.1]);
        let target = column(&[1.0, 0.0, 0.0]);
        let expected = -(0.2 + 0.1) * EPSILON.ln();
        assert!((compute(&output, &target) - expected).abs() < 1e-3);
    }

    #[test]
    fn perfect_confidence_scores_zero() {
        let output = column(&[1.0, 0.0, 0.0]);
        let target = column(&[1.0, 0.0, 0.0]);
        assert!(compute(&output, &target).abs() < 1e-6);
    }

    #[test]
    fn score_is_finite_and_improves_with_accuracy() {
        let target = column(&[0.0, 1.0]);
        let poor = compute(&column(&[0.9, 0.1]), &target);
        let good = compute(&column(&[0.1, 0.9]), &target);
        assert!(poor.is_finite() && good.is_finite());
        assert!(good < poor);
    }
}
