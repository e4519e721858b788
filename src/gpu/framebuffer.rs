//! Off-screen render target with synchronous pixel read-back.

use anyhow::Result;

use super::{GpuContext, Texture};
use crate::raster::RasterImage;

/// An off-screen render target. The backing texture is owned exclusively and
/// shares the framebuffer's lifetime: both are created here and released
/// together by `delete`.
///
/// The texture is cleared at creation, so reading back before the first draw
/// yields a deterministic blank image rather than stale memory; producing
/// meaningful output before a completed draw remains the caller's contract.
pub struct FrameBuffer {
    texture: Texture,
    width: u32,
    height: u32,
}

impl FrameBuffer {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let mut texture = Texture::render_target(gpu, width, height);
        clear(gpu, &mut texture);
        Self {
            texture,
            width,
            height,
        }
    }

    /// View to attach as the render pass color target.
    pub fn attachment(&mut self, gpu: &GpuContext) -> wgpu::TextureView {
        self.texture.view(gpu)
    }

    /// View for sampling the rendered contents in a later pass.
    pub fn texture_view(&mut self, gpu: &GpuContext) -> wgpu::TextureView {
        self.texture.view(gpu)
    }

    /// Synchronously reads back the full width x height RGBA8 contents.
    ///
    /// This flushes the GPU pipeline and blocks until the copy completes; it
    /// must only be called once no further GPU work targets this framebuffer.
    pub fn rendered_bitmap(&mut self, gpu: &GpuContext) -> Result<RasterImage> {
        let padded_row = align_row_bytes(self.width * 4);
        let size = (padded_row as u64) * (self.height as u64);
        let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: self.texture.raw(gpu),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| anyhow::anyhow!("device poll failed during read-back: {:?}", e))?;
        receiver.recv()??;

        let data = buffer_slice.get_mapped_range();
        let pixels = strip_row_padding(&data, self.width, self.height, padded_row);
        drop(data);
        readback.unmap();

        Ok(RasterImage::from_data(self.width, self.height, pixels))
    }

    /// Releases the framebuffer and its backing texture together.
    pub fn delete(&mut self) {
        self.texture.delete();
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

fn clear(gpu: &GpuContext, texture: &mut Texture) {
    let view = texture.view(gpu);
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clear Encoder"),
        });
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Clear Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    gpu.queue.submit(std::iter::once(encoder.finish()));
}

/// Rounds a tightly-packed row size up to wgpu's copy alignment.
fn align_row_bytes(bytes: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (bytes + align - 1) & !(align - 1)
}

/// Drops the per-row alignment padding from a mapped read-back buffer.
fn strip_row_padding(data: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let row_bytes = (width as usize) * 4;
    if padded_row as usize == row_bytes {
        return data[..row_bytes * height as usize].to_vec();
    }
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let start = y * padded_row as usize;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_row_bytes() {
        assert_eq!(align_row_bytes(256), 256);
        assert_eq!(align_row_bytes(400), 512);
        assert_eq!(align_row_bytes(1), 256);
        assert_eq!(align_row_bytes(1280 * 4), 1280 * 4);
    }

    #[test]
    fn test_strip_row_padding() {
        // 2x2 image, rows padded to 12 bytes instead of 8.
        let mut data = Vec::new();
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]);
        data.extend_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16, 0, 0, 0, 0]);
        let pixels = strip_row_padding(&data, 2, 2, 12);
        assert_eq!(
            pixels,
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
        );
    }

    #[test]
    fn test_strip_row_padding_tight() {
        let data = vec![7u8; 16];
        let pixels = strip_row_padding(&data, 2, 2, 8);
        assert_eq!(pixels, data);
    }
}
