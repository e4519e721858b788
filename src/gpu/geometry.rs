//! Unit-quad geometry shared by every pass.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::GpuContext;

/// Vertex for the full-target quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

impl QuadVertex {
    /// Full-target quad. wgpu addresses surface frames and texture
    /// attachments with the same vertical convention (clip-space +Y lands on
    /// texture row 0), so one UV layout serves both the off-screen and the
    /// display path.
    pub const VERTICES: &'static [QuadVertex] = &[
        QuadVertex {
            position: [-1.0, -1.0],
            tex_coords: [0.0, 1.0],
        },
        QuadVertex {
            position: [1.0, -1.0],
            tex_coords: [1.0, 1.0],
        },
        QuadVertex {
            position: [1.0, 1.0],
            tex_coords: [1.0, 0.0],
        },
        QuadVertex {
            position: [-1.0, 1.0],
            tex_coords: [0.0, 0.0],
        },
    ];

    /// Two triangles.
    pub const INDICES: &'static [u16] = &[0, 1, 2, 2, 3, 0];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Owns the quad's vertex and index buffers.
pub struct GeometryBinding {
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
}

impl GeometryBinding {
    /// Uploads the quad vertices and indices.
    pub fn setup_vertices(gpu: &GpuContext) -> Self {
        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Vertex Buffer"),
                contents: bytemuck::cast_slice(QuadVertex::VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Index Buffer"),
                contents: bytemuck::cast_slice(QuadVertex::INDICES),
                usage: wgpu::BufferUsages::INDEX,
            });
        Self {
            vertex_buffer: Some(vertex_buffer),
            index_buffer: Some(index_buffer),
        }
    }

    /// Issues the indexed draw for the quad.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        let (Some(vertex_buffer), Some(index_buffer)) = (&self.vertex_buffer, &self.index_buffer)
        else {
            return;
        };
        render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        render_pass.draw_indexed(0..QuadVertex::INDICES.len() as u32, 0, 0..1);
    }

    /// Releases both buffers. Idempotent.
    pub fn cleanup(&mut self) {
        if let Some(buffer) = self.vertex_buffer.take() {
            buffer.destroy();
        }
        if let Some(buffer) = self.index_buffer.take() {
            buffer.destroy();
        }
    }
}
