// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Arena-backed dense matrix primitives for SpiralEvo.
//!
//! Population evaluation creates thousands of small, short-lived matrices per
//! generation, all of which die together when the process moves on. The crate
//! therefore serves every matrix from a process-wide bump allocator
//! ([`MatrixArena`]) and keeps the algebra kernels deliberately boring:
//! row-major storage, explicit output parameters, deterministic traversal
//! order. Nothing here is clever enough to surprise a profiler.

pub mod arena;
pub mod bytes;
mod error;
pub mod matrix;

pub use arena::MatrixArena;
pub use bytes::HumanSize;
pub use error::{TensorError, TensorResult};
pub use matrix::{Matrix, MatrixD, MatrixT, Scalar};
