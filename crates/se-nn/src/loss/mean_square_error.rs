// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use se_tensor::{matrix, Matrix};

/// `Σ (o - t)² / n` over all elements.
pub(super) fn compute(output: &Matrix, target: &Matrix) -> f32 {
    let mut acc = 0.0f32;
    matrix::map2(output, target, |o, t| {
        let diff = o - t;
        acc += diff * diff;
    });
    acc / (target.rows() * target.cols()) as f32
}

/// Same reduction, with the residual written through `error` first.
pub(super) fn compute_buffered(output: &Matrix, target: &Matrix, error: &mut Matrix) -> f32 {
    matrix::subtract(target, output, error);
    let mut acc = 0.0f32;
    for &v in error.as_slice() {
        acc += v * v;
    }
    acc / (target.rows() * target.cols()) as f32
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
    fn matches_manual_mean() {
        let output = column(&[0.5, -0.5, 1.0]);
        let target = column(&[0.0, 0.0, 1.5]);
        // (0.25 + 0.25 + 0.25) / 3
        assert!((compute(&output, &target) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn zero_for_a_perfect_prediction() {
        let output = column(&[0.1, 0.9]);
        assert_eq!(compute(&output, &output), 0.0);
    }

    #[test]
    fn buffered_path_agrees_with_direct() {
        let output = column(&[0.3, 0.8, -0.2, 0.0]);
        let target = column(&[1.0, 0.0, 0.0, 0.0]);
        let mut error = Matrix::new(4, 1).unwrap();
        let direct = compute(&output, &target);
        let buffered = compute_buffered(&output, &target, &mut error);
        assert_eq!(direct, buffered);
        // The residual is target - output.
        assert!((error.get(0, 0) - 0.7).abs() < 1e-6);
    }
}
