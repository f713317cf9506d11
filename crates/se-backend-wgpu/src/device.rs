// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! The device wrapper that owns everything with a GPU lifetime.
//!
//! One [`GpuDevice`] holds the wgpu device/queue pair, the memory pool, the
//! buffer/texture managers, the named command table, the shader cache, and
//! the pipeline registry. Teardown runs in reverse dependency order from a
//! single call, so partial shutdowns cannot strand pool ranges behind live
//! handles.

use std::path::PathBuf;

use tracing::info;

use crate::buffers::{BufferId, BufferManager, PoolBuffer};
use crate::commands::{CommandTable, Fence};
use crate::memory::{MemoryPool, STORAGE_BINDING_ALIGN};
use crate::pipeline::{ComputePipelineManager, ShaderCache};
use crate::textures::{DataTexture, TextureId, TextureManager};
use crate::GpuError;

pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    pool: MemoryPool,
    buffers: BufferManager,
    textures: TextureManager,
    commands: CommandTable,
    shaders: ShaderCache,
    pipelines: ComputePipelineManager,
}

impl GpuDevice {
    /// Bootstraps instance → adapter → device and wires up the managers.
    /// `shader_dir` roots the shader cache.
    pub fn new(shader_dir: impl Into<PathBuf>) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )
        .ok_or(GpuError::NoAdapter)?;
        let adapter_info = adapter.get_info();
        info!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            "gpu adapter selected"
        );

        let (device, queue) = pollster::block_on(
            adapter.request_device(&wgpu::DeviceDescriptor::default(), None),
        )
        .map_err(|err| GpuError::RequestDevice(err.to_string()))?;

        Ok(Self {
            device,
            queue,
            adapter_info,
            pool: MemoryPool::new(),
            buffers: BufferManager::new(),
            textures: TextureManager::new(),
            commands: CommandTable::new(),
            shaders: ShaderCache::new(shader_dir),
            pipelines: ComputePipelineManager::new(),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn memory(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn memory_mut(&mut self) -> &mut MemoryPool {
        &mut self.pool
    }

    // ----- buffers ---------------------------------------------------------

    /// Carves a pool-backed buffer with bind-group-safe alignment.
    pub fn create_buffer(
        &mut self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> Result<BufferId, GpuError> {
        self.buffers.create(
            &self.device,
            &mut self.pool,
            label,
            size,
            usage,
            STORAGE_BINDING_ALIGN,
        )
    }

    pub fn buffer(&self, id: BufferId) -> Result<&PoolBuffer, GpuError> {
        self.buffers.get(id)
    }

    pub fn destroy_buffer(&mut self, id: BufferId) -> Result<(), GpuError> {
        self.buffers.destroy(&mut self.pool, id)
    }

    /// Uploads host bytes into a pool buffer through the queue.
    pub fn write_buffer(&self, id: BufferId, data: &[u8]) -> Result<(), GpuError> {
        let buffer = self.buffers.get(id)?;
        self.pool
            .write(&self.queue, buffer.allocation(), buffer.label(), data)
    }

    /// Blocking readback of a mappable pool buffer.
    pub fn read_buffer(&self, id: BufferId) -> Result<Vec<u8>, GpuError> {
        let buffer = self.buffers.get(id)?;
        self.pool
            .read(&self.device, buffer.allocation(), buffer.label())
    }

    // ----- textures --------------------------------------------------------

    pub fn create_texture_1d(&mut self, label: &str, width: u32) -> TextureId {
        self.textures.create_1d(&self.device, label, width)
    }

    pub fn texture(&self, id: TextureId) -> Result<&DataTexture, GpuError> {
        self.textures.get(id)
    }

    pub fn destroy_texture(&mut self, id: TextureId) -> Result<(), GpuError> {
        self.textures.destroy(id)
    }

    // ----- command recording -----------------------------------------------

    pub fn begin_commands(&mut self, key: &str) -> Result<(), GpuError> {
        self.commands.get_or_create(key).begin(&self.device)
    }

    pub fn command_encoder(&mut self, key: &str) -> Result<&mut wgpu::CommandEncoder, GpuError> {
        self.commands.get(key)?.encoder()
    }

    pub fn end_commands(&mut self, key: &str) -> Result<(), GpuError> {
        self.commands.get(key)?.end()
    }

    pub fn submit_commands(
        &mut self,
        key: &str,
        fence: Option<&mut Fence>,
    ) -> Result<(), GpuError> {
        self.commands.get(key)?.submit(&self.queue, fence)
    }

    pub fn destroy_commands(&mut self, key: &str) {
        self.commands.destroy(key);
    }

    /// One-shot: record through the closure, submit, and wait idle.
    pub fn immediate(&self, record: impl FnOnce(&mut wgpu::CommandEncoder)) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("se.gpu.immediate"),
            });
        record(&mut encoder);
        self.queue.submit(Some(encoder.finish()));
        self.wait_idle();
    }

    /// Blocks until every submitted command has completed.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    // ----- pipelines -------------------------------------------------------

    /// Loads (or reuses) a shader module and builds the full layout +
    /// pipeline stack for one compute entry point.
    pub fn create_compute_pipeline(
        &mut self,
        file: &str,
        label: &str,
        entry_point: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> Result<
        (
            std::sync::Arc<wgpu::ComputePipeline>,
            std::sync::Arc<wgpu::BindGroupLayout>,
        ),
        GpuError,
    > {
        let module = self.shaders.module(&self.device, file)?;
        let bind_group_layout =
            self.pipelines
                .create_bind_group_layout(&self.device, label, entries);
        let pipeline_layout = self.pipelines.create_pipeline_layout(
            &self.device,
            label,
            &[bind_group_layout.as_ref()],
        );
        let pipeline = self.pipelines.create_pipeline(
            &self.device,
            label,
            pipeline_layout.as_ref(),
            module,
            entry_point,
        );
        Ok((pipeline, bind_group_layout))
    }

    // ----- teardown --------------------------------------------------------

    /// Destroys everything in reverse dependency order: commands, pipelines,
    /// shaders, textures, buffers, then the pool pages themselves.
    pub fn destroy_all(&mut self) {
        self.commands.destroy_all();
        self.pipelines.destroy_all();
        self.shaders.clear();
        self.textures.destroy_all();
        self.buffers.destroy_all(&mut self.pool);
        self.pool.release_all();
    }
}

impl Drop for GpuDevice {
    fn drop(&mut self) {
        self.destroy_all();
    }
}
