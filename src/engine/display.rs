//! Surface presentation: aspect-fit blit of the filtered texture.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use glam::{Mat4, Vec3};
use winit::window::Window;

use crate::gpu::{GeometryBinding, GpuContext, QuadVertex};
use crate::raster::argb_channels;

/// Pan/zoom applied on top of the aspect fit. Purely a display transform;
/// off-screen processing never sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    pub scale: f32,
    pub focus_x: f32,
    pub focus_y: f32,
    pub translate_x: f32,
    pub translate_y: f32,
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            focus_x: 0.0,
            focus_y: 0.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }
}

/// Letterbox/pillarbox scale that fits the input aspect inside the view.
pub fn fit_scale(input_width: f32, input_height: f32, view_width: f32, view_height: f32) -> (f32, f32) {
    let input_aspect = input_width / input_height;
    let view_aspect = view_width / view_height;
    if input_aspect > view_aspect {
        (1.0, view_aspect / input_aspect)
    } else {
        (input_aspect / view_aspect, 1.0)
    }
}

/// Composes projection, user transform, and aspect fit into the blit MVP.
pub fn compose_mvp(
    transform: &DisplayTransform,
    input_size: (u32, u32),
    view_size: (u32, u32),
) -> Mat4 {
    let (sx, sy) = fit_scale(
        input_size.0 as f32,
        input_size.1 as f32,
        view_size.0.max(1) as f32,
        view_size.1.max(1) as f32,
    );
    let projection = Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, -1.0, 1.0);
    let fit = Mat4::from_scale(Vec3::new(sx, sy, 1.0));
    let focus = Vec3::new(transform.focus_x, transform.focus_y, 0.0);
    let user = Mat4::from_translation(Vec3::new(transform.translate_x, transform.translate_y, 0.0))
        * Mat4::from_translation(focus)
        * Mat4::from_scale(Vec3::splat(transform.scale.max(0.01)))
        * Mat4::from_translation(-focus);
    projection * user * fit
}

/// Converts an ARGB packed int into a clear color.
pub fn argb_to_color(argb: u32) -> wgpu::Color {
    let [r, g, b, a] = argb_channels(argb);
    wgpu::Color { r, g, b, a }
}

const BLIT_SHADER: &str = r#"
struct BlitUniforms {
    mvp: mat4x4<f32>,
}

@group(0) @binding(0) var t_frame: texture_2d<f32>;
@group(0) @binding(1) var s_frame: sampler;
@group(0) @binding(2) var<uniform> u_blit: BlitUniforms;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = u_blit.mvp * vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = in.tex_coords;
    return out;
}

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(t_frame, s_frame, tex_coords);
}
"#;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct BlitUniforms {
    mvp: [[f32; 4]; 4],
}

/// The interactive output surface plus the pipeline that blits the final
/// filter texture onto it.
pub struct DisplayTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    geometry: GeometryBinding,
    window: Arc<Window>,
}

impl DisplayTarget {
    pub fn new(
        gpu: &GpuContext,
        surface: wgpu::Surface<'static>,
        window: Arc<Window>,
    ) -> Result<Self> {
        use wgpu::util::DeviceExt;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        let module = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Blit Shader"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(BLIT_SHADER)),
            });

        let bind_group_layout =
            gpu.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Blit Bind Group Layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::VERTEX,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Blit Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let pipeline = gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Blit Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[QuadVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        let uniform_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Blit Uniform Buffer"),
                contents: bytemuck::cast_slice(&[BlitUniforms {
                    mvp: Mat4::IDENTITY.to_cols_array_2d(),
                }]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blit Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let geometry = GeometryBinding::setup_vertices(gpu);

        Ok(Self {
            surface,
            config,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            sampler,
            geometry,
            window,
        })
    }

    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&gpu.device, &self.config);
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Draws the frame texture onto the surface with the given MVP and
    /// background clear color, then presents.
    pub fn present(
        &mut self,
        gpu: &GpuContext,
        frame: &wgpu::TextureView,
        mvp: Mat4,
        background: wgpu::Color,
    ) -> Result<()> {
        gpu.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::cast_slice(&[BlitUniforms {
                mvp: mvp.to_cols_array_2d(),
            }]),
        );

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(frame),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Blit Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(background),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            self.geometry.draw(&mut render_pass);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_scale_letterboxes_wide_input() {
        // 2:1 input in a square view fills the width, halves the height.
        let (sx, sy) = fit_scale(200.0, 100.0, 100.0, 100.0);
        assert_eq!((sx, sy), (1.0, 0.5));
    }

    #[test]
    fn test_fit_scale_pillarboxes_tall_input() {
        let (sx, sy) = fit_scale(100.0, 200.0, 100.0, 100.0);
        assert_eq!((sx, sy), (0.5, 1.0));
    }

    #[test]
    fn test_fit_scale_matching_aspect_is_identity() {
        let (sx, sy) = fit_scale(1920.0, 1080.0, 960.0, 540.0);
        assert!((sx - 1.0).abs() < 1e-6);
        assert!((sy - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mvp_applies_fit_and_zoom() {
        let transform = DisplayTransform {
            scale: 2.0,
            ..Default::default()
        };
        let mvp = compose_mvp(&transform, (200, 100), (100, 100));
        let corner = mvp * glam::Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!((corner.x - 2.0).abs() < 1e-6);
        assert!((corner.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_argb_to_color() {
        let color = argb_to_color(0xFF00_00FF);
        assert_eq!(color.a, 1.0);
        assert_eq!(color.r, 0.0);
        assert_eq!(color.g, 0.0);
        assert_eq!(color.b, 1.0);
    }
}
