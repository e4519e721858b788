//! Shader program compilation, validation, and uniform reflection.

use std::borrow::Cow;

use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;
use thiserror::Error;

use super::{GpuContext, QuadVertex, FRAME_FORMAT};

/// Vertex shader shared by every off-screen pass.
const VERTEX_SHADER: &str = r#"
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
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = in.tex_coords;
    return out;
}
"#;

/// The uniform block binding filters declare their parameters in.
const PARAMS_BINDING: u32 = 2;

/// Shader source with language specification.
///
/// Fragment shaders see a fixed bind interface: the input texture at
/// binding 0, the sampler at binding 1, an optional `Params` uniform block of
/// f32 members at binding 2, and an optional auxiliary texture (LUT,
/// secondary input) at binding 3.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    /// GLSL fragment shader source code (Vulkan-style bindings)
    Glsl(String),
    /// WGSL fragment shader source code
    Wgsl(String),
}

/// Fatal shader failures. These indicate malformed source or an invalid
/// configuration; there is no retry.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader parse error: {log}")]
    Parse { log: String },
    #[error("shader validation error: {log}")]
    Validate { log: String },
    #[error("WGSL generation error: {log}")]
    Backend { log: String },
}

/// A fragment source lowered to validated WGSL plus the reflected layout of
/// its `Params` uniform block.
#[derive(Debug)]
struct PreparedFragment {
    wgsl: String,
    entry_point: &'static str,
    params: Vec<(String, u32)>,
    param_span: u32,
}

/// Converts a GLSL fragment shader to WGSL, failing with the compiler log on
/// parse or validation errors.
fn glsl_to_wgsl(glsl: &str) -> Result<String, ShaderError> {
    let mut frontend = Frontend::default();
    let options = Options::from(ShaderStage::Fragment);
    let module = frontend
        .parse(&options, glsl)
        .map_err(|e| ShaderError::Parse {
            log: format!("{:?}", e),
        })?;
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(&module)
        .map_err(|e| ShaderError::Validate {
            log: format!("{:?}", e),
        })?;
    naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty()).map_err(
        |e| ShaderError::Backend {
            log: format!("{:?}", e),
        },
    )
}

fn prepare_fragment(source: &ShaderSource) -> Result<PreparedFragment, ShaderError> {
    let (wgsl, entry_point) = match source {
        ShaderSource::Glsl(glsl) => (glsl_to_wgsl(glsl)?, "main"),
        ShaderSource::Wgsl(wgsl) => (wgsl.clone(), "fs_main"),
    };

    let module = naga::front::wgsl::parse_str(&wgsl).map_err(|e| ShaderError::Parse {
        log: e.emit_to_string(&wgsl),
    })?;
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|e| ShaderError::Validate {
            log: format!("{:?}", e),
        })?;

    let (params, param_span) = reflect_params(&module);
    Ok(PreparedFragment {
        wgsl,
        entry_point,
        params,
        param_span,
    })
}

/// Finds the `Params` uniform block (group 0, binding 2) and returns its
/// members as (name, byte offset) pairs plus the block's span. Shaders
/// without a params block reflect to an empty layout.
fn reflect_params(module: &naga::Module) -> (Vec<(String, u32)>, u32) {
    for (_, var) in module.global_variables.iter() {
        if var.space != naga::AddressSpace::Uniform {
            continue;
        }
        if !matches!(
            var.binding,
            Some(naga::ResourceBinding {
                group: 0,
                binding: PARAMS_BINDING,
            })
        ) {
            continue;
        }
        if let naga::TypeInner::Struct { members, span } = &module.types[var.ty].inner {
            let params = members
                .iter()
                .map(|member| (member.name.clone().unwrap_or_default(), member.offset))
                .collect();
            return (params, *span);
        }
    }
    (Vec::new(), 0)
}

/// A compiled vertex+fragment pipeline with uniform lookup by name.
///
/// Sources are immutable after creation. Parameter writes go through
/// `set_uniform`, which maps the member name to its reflected byte offset;
/// names the compiler optimized out (or that were never declared) resolve to
/// no offset and the write is a silent no-op, matching the contract that a
/// missing uniform is not an error.
pub struct ShaderProgram {
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    param_buffer: Option<wgpu::Buffer>,
    param_block: Vec<u8>,
    param_offsets: Vec<(String, u32)>,
    dirty: bool,
}

impl ShaderProgram {
    /// Compiles and links the shared quad vertex stage with the given
    /// fragment source. Fails fatally (with the compiler log) on malformed
    /// source.
    pub fn of(gpu: &GpuContext, fragment: &ShaderSource) -> Result<Self, ShaderError> {
        let prepared = prepare_fragment(fragment)?;

        let vertex_module = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Filter Vertex Shader"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(VERTEX_SHADER)),
            });
        let fragment_module = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Filter Fragment Shader"),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(prepared.wgsl)),
            });

        let bind_group_layout =
            gpu.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Filter Bind Group Layout"),
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
                            binding: PARAMS_BINDING,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 3,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                    ],
                });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Filter Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let pipeline = gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Filter Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some("vs_main"),
                    buffers: &[QuadVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some(prepared.entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: FRAME_FORMAT,
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

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Filter Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // Uniform bindings need a buffer even when the shader declares no
        // params block; 16 bytes is the smallest comfortable allocation.
        let block_size = prepared.param_span.max(16).div_ceil(16) * 16;
        let param_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Filter Params"),
            size: block_size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            pipeline: Some(pipeline),
            bind_group_layout,
            sampler,
            param_buffer: Some(param_buffer),
            param_block: vec![0; block_size as usize],
            param_offsets: prepared.params,
            dirty: true,
        })
    }

    /// Byte offset of the named `Params` member, or `None` when the uniform
    /// is absent or was optimized out.
    pub fn uniform_offset(&self, name: &str) -> Option<u32> {
        self.param_offsets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, offset)| *offset)
    }

    /// Writes a float uniform by name. Silently a no-op for absent names.
    pub fn set_uniform(&mut self, name: &str, value: f32) {
        let Some(offset) = self.uniform_offset(name) else {
            return;
        };
        let offset = offset as usize;
        self.param_block[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        self.dirty = true;
    }

    /// Uploads the CPU-side param block if any uniform changed.
    pub fn flush(&mut self, gpu: &GpuContext) {
        if !self.dirty {
            return;
        }
        if let Some(buffer) = &self.param_buffer {
            gpu.queue.write_buffer(buffer, 0, &self.param_block);
        }
        self.dirty = false;
    }

    /// Builds the per-draw bind group for this program.
    pub fn create_bind_group(
        &self,
        gpu: &GpuContext,
        input: &wgpu::TextureView,
        aux: &wgpu::TextureView,
    ) -> Option<wgpu::BindGroup> {
        let buffer = self.param_buffer.as_ref()?;
        Some(gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Filter Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: PARAMS_BINDING,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(aux),
                },
            ],
        }))
    }

    /// Activates the program for subsequent draws in the pass.
    pub fn activate(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        if let Some(pipeline) = &self.pipeline {
            render_pass.set_pipeline(pipeline);
        }
    }

    /// Releases the pipeline and its param buffer. Idempotent.
    pub fn delete(&mut self) {
        self.pipeline = None;
        if let Some(buffer) = self.param_buffer.take() {
            buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_FS: &str = r#"
@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_input: sampler;
struct Params {
    brightness: f32,
    contrast: f32,
}
@group(0) @binding(2) var<uniform> params: Params;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, tex_coords);
    return vec4<f32>(
        (color.rgb + vec3<f32>(params.brightness) - vec3<f32>(0.5)) * params.contrast
            + vec3<f32>(0.5),
        color.a,
    );
}
"#;

    #[test]
    fn test_reflect_params_offsets() {
        let prepared = prepare_fragment(&ShaderSource::Wgsl(TEST_FS.to_string())).unwrap();
        assert_eq!(prepared.entry_point, "fs_main");
        assert_eq!(
            prepared.params,
            vec![("brightness".to_string(), 0), ("contrast".to_string(), 4)]
        );
        assert_eq!(prepared.param_span, 8);
    }

    #[test]
    fn test_reflect_no_params_block() {
        let source = r#"
@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_input: sampler;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(t_input, s_input, tex_coords);
}
"#;
        let prepared = prepare_fragment(&ShaderSource::Wgsl(source.to_string())).unwrap();
        assert!(prepared.params.is_empty());
        assert_eq!(prepared.param_span, 0);
    }

    #[test]
    fn test_malformed_wgsl_is_fatal() {
        let err = prepare_fragment(&ShaderSource::Wgsl("fn broken(".to_string())).unwrap_err();
        assert!(matches!(err, ShaderError::Parse { .. }));
    }

    #[test]
    fn test_glsl_converts_to_wgsl() {
        let glsl = r#"
#version 450
layout(location = 0) in vec2 v_tex_coords;
layout(location = 0) out vec4 out_color;
layout(set = 0, binding = 2) uniform Params {
    float amount;
};

void main() {
    out_color = vec4(v_tex_coords * amount, 0.0, 1.0);
}
"#;
        let prepared = prepare_fragment(&ShaderSource::Glsl(glsl.to_string())).unwrap();
        assert_eq!(prepared.entry_point, "main");
        assert_eq!(prepared.params, vec![("amount".to_string(), 0)]);
    }
}
