// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Logical buffers bound to pool ranges.
//!
//! A [`PoolBuffer`] is the handle the rest of the backend works with: a
//! labelled byte window inside one of the pool's pages. Creation carves a
//! range, destruction releases it; the manager and the pool always move in
//! lockstep so a forgotten destroy shows up as pool fragmentation, not a
//! leak of device handles.

use std::num::NonZeroU64;

use crate::memory::{MemoryPool, PoolAllocation};
use crate::GpuError;

/// Stable identity of a managed buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

/// A labelled allocation with enough context to build bind groups.
pub struct PoolBuffer {
    id: BufferId,
    label: String,
    allocation: PoolAllocation,
}

impl PoolBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn offset(&self) -> u64 {
        self.allocation.offset
    }

    pub fn size(&self) -> u64 {
        self.allocation.size
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.allocation.buffer
    }

    pub fn allocation(&self) -> &PoolAllocation {
        &self.allocation
    }

    /// The binding for this window of the page.
    pub fn binding(&self) -> wgpu::BufferBinding<'_> {
        wgpu::BufferBinding {
            buffer: &self.allocation.buffer,
            offset: self.allocation.offset,
            size: NonZeroU64::new(self.allocation.size),
        }
    }

    pub fn resource(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(self.binding())
    }
}

/// Creates and destroys [`PoolBuffer`]s against a [`MemoryPool`].
pub struct BufferManager {
    buffers: Vec<PoolBuffer>,
    next_id: u64,
}

impl BufferManager {
    pub fn new() -> Self {
        Self {
            buffers: Vec::new(),
            next_id: 0,
        }
    }

    /// Carves `size` bytes out of a page with exactly `usage` and wraps the
    /// range in a handle.
    pub fn create(
        &mut self,
        device: &wgpu::Device,
        pool: &mut MemoryPool,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
        align: u64,
    ) -> Result<BufferId, GpuError> {
        let allocation = pool.allocate(device, usage, size, align)?;
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.buffers.push(PoolBuffer {
            id,
            label: label.to_owned(),
            allocation,
        });
        Ok(id)
    }

    pub fn get(&self, id: BufferId) -> Result<&PoolBuffer, GpuError> {
        self.buffers
            .iter()
            .find(|b| b.id == id)
            .ok_or(GpuError::UnknownBuffer(id))
    }

    /// Releases the buffer's range back to the pool and drops the handle.
    pub fn destroy(&mut self, pool: &mut MemoryPool, id: BufferId) -> Result<(), GpuError> {
        let index = self
            .buffers
            .iter()
            .position(|b| b.id == id)
            .ok_or(GpuError::UnknownBuffer(id))?;
        let buffer = self.buffers.swap_remove(index);
        pool.release(buffer.allocation);
        Ok(())
    }

    /// Releases every managed buffer.
    pub fn destroy_all(&mut self, pool: &mut MemoryPool) {
        for buffer in self.buffers.drain(..) {
            pool.release(buffer.allocation);
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::new()
    }
}
