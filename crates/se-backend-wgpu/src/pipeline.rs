// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Shader modules and compute-pipeline plumbing.
//!
//! Shader modules are cached by file path (WGSL read as text, `.spv`/
//! `.spirv` read as words), so repeated pipeline construction never touches
//! the filesystem twice. Bind-group layouts, pipeline layouts, and pipelines
//! are registered on creation so the whole graphics state tears down in one
//! call, in reverse dependency order.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::GpuError;

/// Cache of shader modules keyed by their on-disk path.
pub struct ShaderCache {
    shader_dir: PathBuf,
    modules: HashMap<PathBuf, wgpu::ShaderModule>,
}

impl ShaderCache {
    /// Creates a cache rooted at `shader_dir`.
    pub fn new(shader_dir: impl Into<PathBuf>) -> Self {
        Self {
            shader_dir: shader_dir.into(),
            modules: HashMap::new(),
        }
    }

    pub fn shader_dir(&self) -> &Path {
        &self.shader_dir
    }

    /// Drops every cached module.
    pub fn clear(&mut self) {
        self.modules.clear();
    }

    /// Returns the module for `file`, compiling it from disk on first use.
    pub fn module(
        &mut self,
        device: &wgpu::Device,
        file: &str,
    ) -> Result<&wgpu::ShaderModule, GpuError> {
        let path = self.shader_dir.join(file);
        if !self.modules.contains_key(&path) {
            let module = Self::compile(device, &path)?;
            self.modules.insert(path.clone(), module);
        }
        Ok(self
            .modules
            .get(&path)
            .expect("shader cache entry missing"))
    }

    fn compile(device: &wgpu::Device, path: &Path) -> Result<wgpu::ShaderModule, GpuError> {
        let label = path.to_string_lossy();
        let is_spirv = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("spv") | Some("spirv")
        );

        let module = if is_spirv {
            let bytes = fs::read(path).map_err(|source| GpuError::ShaderIo {
                source,
                path: path.to_path_buf(),
            })?;
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::util::make_spirv(&bytes),
            })
        } else {
            let text = fs::read_to_string(path).map_err(|source| GpuError::ShaderIo {
                source,
                path: path.to_path_buf(),
            })?;
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(text.into()),
            })
        };
        Ok(module)
    }
}

/// Layout entry for a storage buffer visible to compute.
pub fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Layout entry for a uniform buffer visible to compute.
pub fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Layout entry for a non-filterable 1D data texture.
pub fn texture_1d_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D1,
            multisampled: false,
        },
        count: None,
    }
}

/// Creates layouts and pipelines, registering everything for bulk teardown.
pub struct ComputePipelineManager {
    bind_group_layouts: Vec<Arc<wgpu::BindGroupLayout>>,
    pipeline_layouts: Vec<Arc<wgpu::PipelineLayout>>,
    pipelines: Vec<Arc<wgpu::ComputePipeline>>,
}

impl ComputePipelineManager {
    pub fn new() -> Self {
        Self {
            bind_group_layouts: Vec::new(),
            pipeline_layouts: Vec::new(),
            pipelines: Vec::new(),
        }
    }

    pub fn create_bind_group_layout(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> Arc<wgpu::BindGroupLayout> {
        let layout = Arc::new(device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            },
        ));
        self.bind_group_layouts.push(layout.clone());
        layout
    }

    pub fn create_pipeline_layout(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        bind_group_layouts: &[&wgpu::BindGroupLayout],
    ) -> Arc<wgpu::PipelineLayout> {
        let layout = Arc::new(device.create_pipeline_layout(
            &wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts,
                push_constant_ranges: &[],
            },
        ));
        self.pipeline_layouts.push(layout.clone());
        layout
    }

    pub fn create_pipeline(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        layout: &wgpu::PipelineLayout,
        module: &wgpu::ShaderModule,
        entry_point: &str,
    ) -> Arc<wgpu::ComputePipeline> {
        let pipeline = Arc::new(device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                module,
                entry_point,
                compilation_options: Default::default(),
            },
        ));
        self.pipelines.push(pipeline.clone());
        pipeline
    }

    /// Drops every registered pipeline, then the layouts beneath them.
    pub fn destroy_all(&mut self) {
        self.pipelines.clear();
        self.pipeline_layouts.clear();
        self.bind_group_layouts.clear();
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

impl Default for ComputePipelineManager {
    fn default() -> Self {
        Self::new()
    }
}
