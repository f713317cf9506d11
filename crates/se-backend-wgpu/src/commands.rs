// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Named command buffers with an explicit lifecycle.
//!
//! Recording in wgpu is a one-way funnel (encoder → command buffer →
//! submission) with the states hidden inside the types. Re-exposing them as
//! an explicit `UNDEFINED → RECORDING → RECORDED → SUBMITTED` machine keeps
//! misuse (submitting twice, recording into a finished buffer) a returned
//! error instead of a validation panic deep inside the driver.

use std::collections::HashMap;

use crate::buffers::PoolBuffer;
use crate::textures::DataTexture;
use crate::GpuError;

/// Lifecycle of one named command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandState {
    Undefined,
    Recording,
    Recorded,
    Submitted,
}

/// Wait handle for a submission. Waiting is idempotent; an unsignalled fence
/// waits on nothing.
pub struct Fence {
    submission: Option<wgpu::SubmissionIndex>,
}

impl Fence {
    pub fn new() -> Self {
        Self { submission: None }
    }

    /// True once a submission has been attached and not yet waited on.
    pub fn is_pending(&self) -> bool {
        self.submission.is_some()
    }

    /// Blocks until the attached submission completes, then resets.
    pub fn wait(&mut self, device: &wgpu::Device) {
        if let Some(index) = self.submission.take() {
            let _ = device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        }
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new()
    }
}

/// A reusable, named unit of recorded GPU work.
pub struct CommandBuffer {
    label: String,
    state: CommandState,
    encoder: Option<wgpu::CommandEncoder>,
    recorded: Option<wgpu::CommandBuffer>,
}

impl CommandBuffer {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: CommandState::Undefined,
            encoder: None,
            recorded: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    fn expect_state(&self, expected: CommandState) -> Result<(), GpuError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(GpuError::BadCommandState {
                label: self.label.clone(),
                state: self.state,
                expected,
            })
        }
    }

    /// Opens a fresh encoder. Legal from any state except `Recording`;
    /// beginning a submitted buffer recycles it, like resetting a pooled
    /// buffer before reuse.
    pub fn begin(&mut self, device: &wgpu::Device) -> Result<(), GpuError> {
        if self.state == CommandState::Recording {
            return Err(GpuError::BadCommandState {
                label: self.label.clone(),
                state: self.state,
                expected: CommandState::Undefined,
            });
        }
        self.encoder = Some(device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(self.label.as_str()),
        }));
        self.recorded = None;
        self.state = CommandState::Recording;
        Ok(())
    }

    /// The live encoder; only valid while recording.
    pub fn encoder(&mut self) -> Result<&mut wgpu::CommandEncoder, GpuError> {
        self.expect_state(CommandState::Recording)?;
        Ok(self
            .encoder
            .as_mut()
            .expect("recording state implies a live encoder"))
    }

    /// Finishes the encoder into a submittable buffer.
    pub fn end(&mut self) -> Result<(), GpuError> {
        self.expect_state(CommandState::Recording)?;
        let encoder = self
            .encoder
            .take()
            .expect("recording state implies a live encoder");
        self.recorded = Some(encoder.finish());
        self.state = CommandState::Recorded;
        Ok(())
    }

    /// Submits the recorded buffer, optionally attaching the submission to a
    /// fence for a later blocking wait.
    pub fn submit(
        &mut self,
        queue: &wgpu::Queue,
        fence: Option<&mut Fence>,
    ) -> Result<(), GpuError> {
        self.expect_state(CommandState::Recorded)?;
        let recorded = self
            .recorded
            .take()
            .expect("recorded state implies a finished buffer");
        let index = queue.submit(Some(recorded));
        if let Some(fence) = fence {
            fence.submission = Some(index);
        }
        self.state = CommandState::Submitted;
        Ok(())
    }
}

/// Registry of named command buffers for reuse and bulk teardown.
pub struct CommandTable {
    buffers: HashMap<String, CommandBuffer>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
        }
    }

    pub fn get_or_create(&mut self, key: &str) -> &mut CommandBuffer {
        self.buffers
            .entry(key.to_owned())
            .or_insert_with(|| CommandBuffer::new(key))
    }

    pub fn get(&mut self, key: &str) -> Result<&mut CommandBuffer, GpuError> {
        self.buffers
            .get_mut(key)
            .ok_or_else(|| GpuError::UnknownCommandBuffer(key.to_owned()))
    }

    pub fn destroy(&mut self, key: &str) {
        self.buffers.remove(key);
    }

    pub fn destroy_all(&mut self) {
        self.buffers.clear();
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Records a copy between two pool windows. Sizes must already agree.
pub fn copy_buffer_to_buffer(
    encoder: &mut wgpu::CommandEncoder,
    src: &PoolBuffer,
    dst: &PoolBuffer,
    size: u64,
) {
    encoder.copy_buffer_to_buffer(src.raw(), src.offset(), dst.raw(), dst.offset(), size);
}

/// Records an upload of a pool window into a 1D data texture.
pub fn copy_buffer_to_texture(
    encoder: &mut wgpu::CommandEncoder,
    src: &PoolBuffer,
    dst: &DataTexture,
) {
    encoder.copy_buffer_to_texture(
        wgpu::ImageCopyBuffer {
            buffer: src.raw(),
            layout: wgpu::ImageDataLayout {
                offset: src.offset(),
                bytes_per_row: None,
                rows_per_image: None,
            },
        },
        wgpu::ImageCopyTexture {
            texture: dst.raw(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::Extent3d {
            width: dst.width(),
            height: 1,
            depth_or_array_layers: 1,
        },
    );
}

/// Records a readback of a 1D data texture into a pool window.
pub fn copy_texture_to_buffer(
    encoder: &mut wgpu::CommandEncoder,
    src: &DataTexture,
    dst: &PoolBuffer,
) {
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: src.raw(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: dst.raw(),
            layout: wgpu::ImageDataLayout {
                offset: dst.offset(),
                bytes_per_row: None,
                rows_per_image: None,
            },
        },
        wgpu::Extent3d {
            width: src.width(),
            height: 1,
            depth_or_array_layers: 1,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_buffers_start_undefined() {
        let cb = CommandBuffer::new("test");
        assert_eq!(cb.state(), CommandState::Undefined);
        assert_eq!(cb.label(), "test");
    }

    #[test]
    fn encoder_access_outside_recording_is_an_error() {
        let mut cb = CommandBuffer::new("test");
        assert!(matches!(
            cb.encoder(),
            Err(GpuError::BadCommandState { .. })
        ));
        assert!(matches!(cb.end(), Err(GpuError::BadCommandState { .. })));
    }

    #[test]
    fn table_reuses_buffers_by_key() {
        let mut table = CommandTable::new();
        table.get_or_create("upload");
        table.get_or_create("upload");
        assert_eq!(table.len(), 1);
        assert!(table.get("upload").is_ok());
        assert!(table.get("missing").is_err());
        table.destroy_all();
        assert!(table.is_empty());
    }

    #[test]
    fn unsignalled_fence_is_not_pending() {
        let fence = Fence::new();
        assert!(!fence.is_pending());
    }
}
