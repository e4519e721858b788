//! GPU 2D texture wrapper with explicit lifetime management.

use super::{GpuContext, FRAME_FORMAT};
use crate::raster::RasterImage;

/// A GPU 2D texture of a declared size. The wrapper owns the handle
/// exclusively: the handle is either live or deleted, and `delete` is
/// idempotent. A deleted texture is lazily recreated (blank) the next time a
/// view is requested, matching the lazy-allocation contract of render
/// targets whose contents are rewritten every frame.
pub struct Texture {
    handle: Option<wgpu::Texture>,
    width: u32,
    height: u32,
    usage: wgpu::TextureUsages,
    label: &'static str,
}

impl Texture {
    /// Creates a texture that shader passes render into and later sample.
    pub fn render_target(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        let handle = allocate(gpu, "Render Target Texture", width, height, usage);
        Self {
            handle: Some(handle),
            width,
            height,
            usage,
            label: "Render Target Texture",
        }
    }

    /// Creates a sampled texture and uploads the given pixels into it.
    pub fn from_raster(gpu: &GpuContext, image: &RasterImage) -> Self {
        let usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        let handle = allocate(gpu, "Source Texture", image.width, image.height, usage);
        let texture = Self {
            handle: Some(handle),
            width: image.width,
            height: image.height,
            usage,
            label: "Source Texture",
        };
        texture.upload(gpu, image);
        texture
    }

    fn upload(&self, gpu: &GpuContext, image: &RasterImage) {
        let Some(handle) = &self.handle else {
            return;
        };
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: handle,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.width * 4),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Returns a view for binding or attachment, recreating the underlying
    /// handle (blank) if it was deleted.
    pub fn view(&mut self, gpu: &GpuContext) -> wgpu::TextureView {
        self.raw(gpu)
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// The live handle, recreating it if deleted.
    pub(crate) fn raw(&mut self, gpu: &GpuContext) -> &wgpu::Texture {
        self.handle
            .get_or_insert_with(|| allocate(gpu, self.label, self.width, self.height, self.usage))
    }

    /// Releases the GPU handle. Safe to call repeatedly; a no-op after the
    /// first call.
    pub fn delete(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.destroy();
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.handle.is_none()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

fn allocate(
    gpu: &GpuContext,
    label: &str,
    width: u32,
    height: u32,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FRAME_FORMAT,
        usage,
        view_formats: &[],
    })
}
