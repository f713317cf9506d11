// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Networks that learn by surviving, not by gradient descent.
//!
//! A [`Population`] holds `n` fixed-topology feed-forward [`Network`]s. Each
//! generation every subject is scored on a mini-batch of labelled samples by
//! a parallel forward pass, and its weights are then perturbed in place with
//! a mutation rate derived from that score: good subjects drift, bad
//! subjects scramble. There is no selection, no crossover, and deliberately
//! no backpropagation.

pub mod activation;
pub mod layer;
pub mod loss;
pub mod network;
pub mod population;
pub mod rng;
pub mod sample;

pub use activation::Activation;
pub use layer::Layer;
pub use loss::Loss;
pub use network::{ForwardScratch, LayerSpec, Network};
pub use population::{Population, Statistics, Subject};
pub use sample::Sample;
