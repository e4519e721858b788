//! GPU resource layer: context acquisition, textures, framebuffers,
//! shader programs, and quad geometry.

mod context;
mod framebuffer;
mod geometry;
mod shader;
mod texture;

pub use context::GpuContext;
pub use framebuffer::FrameBuffer;
pub use geometry::{GeometryBinding, QuadVertex};
pub use shader::{ShaderError, ShaderProgram, ShaderSource};
pub use texture::Texture;

/// Color format used for every off-screen pass and read-back.
pub const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
