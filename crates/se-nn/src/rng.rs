// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The process-wide random generator.
//!
//! Initialisation, mutation, and sample selection all draw from one ChaCha20
//! stream guarded by a mutex. Evaluation workers never touch it; randomness
//! stays on the controller thread, which is what makes a seeded run
//! reproducible end to end.

use std::sync::{Mutex, OnceLock};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

static GENERATOR: OnceLock<Mutex<ChaCha20Rng>> = OnceLock::new();

fn generator() -> &'static Mutex<ChaCha20Rng> {
    GENERATOR.get_or_init(|| Mutex::new(ChaCha20Rng::from_entropy()))
}

/// Replaces the generator state with a deterministic stream.
pub fn reseed(seed: u64) {
    *generator().lock().expect("rng poisoned") = ChaCha20Rng::seed_from_u64(seed);
}

/// Runs `f` with exclusive access to the generator.
pub fn with<R>(f: impl FnOnce(&mut ChaCha20Rng) -> R) -> R {
    f(&mut generator().lock().expect("rng poisoned"))
}

/// One draw from U[-1, 1]; the distribution weights and biases live in.
pub fn uniform_signed() -> f32 {
    with(|rng| rng.gen_range(-1.0f32..=1.0))
}

/// One draw from U[0, 1); mutation gates compare against this.
pub fn uniform_unit() -> f64 {
    with(|rng| rng.gen_range(0.0f64..1.0))
}

/// Uniform index into `[0, bound)`. `bound` must be nonzero.
pub fn sample_index(bound: usize) -> usize {
    with(|rng| rng.gen_range(0..bound))
}
