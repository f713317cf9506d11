// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use core::fmt;
use std::error::Error;

/// Result alias used throughout the tensor crate.
pub type TensorResult<T> = Result<T, TensorError>;

/// Errors emitted by the arena and the matrix kernels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TensorError {
    /// The system allocator refused to back a new arena chunk.
    OutOfMemory {
        requested: usize,
        allocated: usize,
        wasted: usize,
    },
    /// An operator was asked to combine matrices of incompatible shapes.
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// A constructor received a shape whose element count overflows `usize`.
    InvalidDimensions { rows: usize, cols: usize },
    /// Numeric guard detected a non-finite value where an activation or loss
    /// requires finite input.
    NonFiniteValue { label: &'static str },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::OutOfMemory {
                requested,
                allocated,
                wasted,
            } => {
                write!(
                    f,
                    "arena out of memory: requested {requested} bytes \
                     (allocated {allocated}, wasted {wasted})"
                )
            }
            TensorError::ShapeMismatch { left, right } => {
                write!(
                    f,
                    "shape mismatch: left={:?}, right={:?} cannot be combined",
                    left, right
                )
            }
            TensorError::InvalidDimensions { rows, cols } => {
                write!(f, "invalid matrix dimensions ({rows} x {cols})")
            }
            TensorError::NonFiniteValue { label } => {
                write!(f, "non-finite value in {label}")
            }
        }
    }
}

impl Error for TensorError {}
