// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! WGPU compute backend for the population forward pass.
//!
//! The backend mirrors the CPU evaluator structurally (a device wrapper, a
//! range-coalescing memory sub-allocator over large buffer pages, buffer and
//! texture managers coupled to it, named command buffers with an explicit
//! lifecycle, and a shader/pipeline cache) but shares no code with it. The
//! CPU arena never frees; the device pool releases and coalesces. Mixing the
//! two contracts would corrupt whichever side you picked, so the build
//! selects exactly one path.

pub mod buffers;
pub mod commands;
pub mod device;
pub mod forward;
pub mod memory;
pub mod pipeline;
pub mod textures;

use std::path::PathBuf;

use thiserror::Error;

pub use buffers::{BufferId, BufferManager, PoolBuffer};
pub use commands::{CommandBuffer, CommandState, CommandTable, Fence};
pub use device::GpuDevice;
pub use forward::GpuEvaluator;
pub use memory::{MemoryPool, PoolAllocation, Range, DEFAULT_PAGE_SIZE, STORAGE_BINDING_ALIGN};
pub use pipeline::{ComputePipelineManager, ShaderCache};
pub use textures::{DataTexture, TextureId, TextureManager};

/// Errors surfaced by every layer of the device backend.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to acquire GPU device: {0}")]
    RequestDevice(String),
    #[error("failed to read shader '{path}'")]
    ShaderIo {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("zero-size device allocation")]
    EmptyAllocation,
    #[error("buffer '{label}' lives on a page with usage {usage:?}; the operation needs {required:?}")]
    UsageMismatch {
        label: String,
        usage: wgpu::BufferUsages,
        required: wgpu::BufferUsages,
    },
    #[error("buffer mapping failed")]
    Map,
    #[error("unknown command buffer '{0}'")]
    UnknownCommandBuffer(String),
    #[error("command buffer '{label}' is {state:?}, expected {expected:?}")]
    BadCommandState {
        label: String,
        state: CommandState,
        expected: CommandState,
    },
    #[error("unknown buffer id {0:?}")]
    UnknownBuffer(BufferId),
    #[error("unknown texture id {0:?}")]
    UnknownTexture(TextureId),
    #[error("evaluator sized for {expected} {what}, got {got}")]
    CapacityMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}
