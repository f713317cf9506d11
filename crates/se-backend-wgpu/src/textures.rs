// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! 1D data textures for the image-backed upload path.
//!
//! Parameter and sample blocks can live in `R32Float` 1D textures instead of
//! storage buffers when the adapter samples faster than it loads. wgpu owns
//! texture memory outright, so unlike buffers there is no pool range to
//! couple to; the manager owns the lifetime and nothing else.

use crate::GpuError;

/// Stable identity of a managed texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(u64);

/// One 1D `R32Float` texture plus its sampling view.
pub struct DataTexture {
    id: TextureId,
    label: String,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
}

impl DataTexture {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn resource(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::TextureView(&self.view)
    }
}

/// Creates and destroys [`DataTexture`]s.
pub struct TextureManager {
    textures: Vec<DataTexture>,
    next_id: u64,
}

impl TextureManager {
    pub fn new() -> Self {
        Self {
            textures: Vec::new(),
            next_id: 0,
        }
    }

    /// Creates a `width x 1` `R32Float` texture usable as a copy target and
    /// a sampled binding.
    pub fn create_1d(
        &mut self,
        device: &wgpu::Device,
        label: &str,
        width: u32,
    ) -> TextureId {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D1,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.push(DataTexture {
            id,
            label: label.to_owned(),
            texture,
            view,
            width,
        });
        id
    }

    pub fn get(&self, id: TextureId) -> Result<&DataTexture, GpuError> {
        self.textures
            .iter()
            .find(|t| t.id == id)
            .ok_or(GpuError::UnknownTexture(id))
    }

    pub fn destroy(&mut self, id: TextureId) -> Result<(), GpuError> {
        let index = self
            .textures
            .iter()
            .position(|t| t.id == id)
            .ok_or(GpuError::UnknownTexture(id))?;
        let texture = self.textures.swap_remove(index);
        texture.texture.destroy();
        Ok(())
    }

    pub fn destroy_all(&mut self) {
        for texture in self.textures.drain(..) {
            texture.texture.destroy();
        }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

impl Default for TextureManager {
    fn default() -> Self {
        Self::new()
    }
}
