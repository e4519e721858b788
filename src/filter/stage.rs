//! Shared single-pass filter machinery.

use anyhow::{Context, Result};

use super::{Filter, FilterChannel, FilterState, ParamBinding};
use crate::gpu::{FrameBuffer, GeometryBinding, GpuContext, ShaderProgram, ShaderSource, Texture};
use crate::raster::RasterImage;

const PASSTHROUGH_FS: &str = r#"
@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_input: sampler;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(t_input, s_input, tex_coords);
}
"#;

/// One shader program plus the framebuffer it renders into. Multi-pass
/// filters own several of these and chain them.
pub struct FilterStage {
    program: ShaderProgram,
    geometry: GeometryBinding,
    framebuffer: Option<FrameBuffer>,
    aux: Option<Texture>,
    placeholder: Texture,
}

impl FilterStage {
    pub fn new(gpu: &GpuContext, fragment: &ShaderSource) -> Result<Self> {
        let program = ShaderProgram::of(gpu, fragment)?;
        let geometry = GeometryBinding::setup_vertices(gpu);
        // Unused aux binding samples a 1x1 white texture.
        let placeholder = Texture::from_raster(gpu, &RasterImage::solid(1, 1, [255; 4]));
        Ok(Self {
            program,
            geometry,
            framebuffer: None,
            aux: None,
            placeholder,
        })
    }

    /// Uploads an auxiliary texture (e.g. a LUT) bound at binding 3.
    pub fn set_aux(&mut self, gpu: &GpuContext, image: &RasterImage) {
        if let Some(mut old) = self.aux.take() {
            old.delete();
        }
        self.aux = Some(Texture::from_raster(gpu, image));
    }

    /// Discards the current framebuffer and allocates one at the new size.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if let Some(mut old) = self.framebuffer.take() {
            old.delete();
        }
        self.framebuffer = Some(FrameBuffer::new(gpu, width, height));
    }

    pub fn set_uniform(&mut self, name: &str, value: f32) {
        self.program.set_uniform(name, value);
    }

    /// Renders one quad pass from `input` into the stage's framebuffer and
    /// returns a view of the result.
    pub fn render(&mut self, gpu: &GpuContext, input: &wgpu::TextureView) -> Result<wgpu::TextureView> {
        self.program.flush(gpu);
        let aux_view = match &mut self.aux {
            Some(texture) => texture.view(gpu),
            None => self.placeholder.view(gpu),
        };
        let bind_group = self
            .program
            .create_bind_group(gpu, input, &aux_view)
            .context("shader program was deleted")?;
        let framebuffer = self
            .framebuffer
            .as_mut()
            .context("filter framebuffer missing; input size was never set")?;
        let target = framebuffer.attachment(gpu);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Filter Pass Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Filter Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
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
            self.program.activate(&mut render_pass);
            render_pass.set_bind_group(0, &bind_group, &[]);
            self.geometry.draw(&mut render_pass);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));

        Ok(framebuffer.texture_view(gpu))
    }

    pub fn rendered_bitmap(&mut self, gpu: &GpuContext) -> Result<RasterImage> {
        self.framebuffer
            .as_mut()
            .context("filter framebuffer missing; nothing was rendered")?
            .rendered_bitmap(gpu)
    }

    pub fn destroy(&mut self) {
        self.program.delete();
        self.geometry.cleanup();
        if let Some(mut framebuffer) = self.framebuffer.take() {
            framebuffer.delete();
        }
        if let Some(mut aux) = self.aux.take() {
            aux.delete();
        }
        self.placeholder.delete();
    }
}

/// A single-pass filter: one shader, one framebuffer, and a set of channel
/// bindings mapping normalized progress onto shader uniforms. Concrete
/// filters are thin constructors over this type.
pub struct ShaderFilter {
    label: String,
    fragment: ShaderSource,
    bindings: Vec<ParamBinding>,
    lut: Option<RasterImage>,
    state: FilterState,
    stage: Option<FilterStage>,
}

impl ShaderFilter {
    pub fn new(label: &str, fragment: ShaderSource, bindings: Vec<ParamBinding>) -> Self {
        Self {
            label: label.to_string(),
            fragment,
            bindings,
            lut: None,
            state: FilterState::Uninitialized,
            stage: None,
        }
    }

    /// Identity filter; also the export path for the unedited image.
    pub fn passthrough() -> Self {
        Self::new(
            "passthrough",
            ShaderSource::Wgsl(PASSTHROUGH_FS.to_string()),
            Vec::new(),
        )
    }

    /// Attaches an auxiliary image uploaded at init and bound at binding 3.
    pub fn with_aux(mut self, image: RasterImage) -> Self {
        self.lut = Some(image);
        self
    }
}

impl Filter for ShaderFilter {
    fn label(&self) -> &str {
        &self.label
    }

    fn state(&self) -> FilterState {
        self.state
    }

    fn channels(&self) -> Vec<FilterChannel> {
        self.bindings.iter().map(|b| b.channel).collect()
    }

    fn ensure_init(&mut self, gpu: &GpuContext) -> Result<()> {
        if !self.state.begin_init()? {
            return Ok(());
        }
        let mut stage = FilterStage::new(gpu, &self.fragment)?;
        if let Some(lut) = &self.lut {
            stage.set_aux(gpu, lut);
        }
        self.stage = Some(stage);
        Ok(())
    }

    fn on_input_resized(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        let stage = self
            .stage
            .as_mut()
            .context("filter not initialized before resize")?;
        stage.resize(gpu, width, height);
        Ok(())
    }

    fn draw_frame(
        &mut self,
        gpu: &GpuContext,
        input: &wgpu::TextureView,
    ) -> Result<Option<wgpu::TextureView>> {
        let stage = self
            .stage
            .as_mut()
            .context("filter not initialized before draw")?;
        for binding in &self.bindings {
            stage.set_uniform(&binding.uniform, binding.value);
        }
        Ok(Some(stage.render(gpu, input)?))
    }

    fn set_progress(&mut self, value: f32, channel: FilterChannel) {
        for binding in &mut self.bindings {
            if binding.channel == channel {
                binding.value = binding.range.remap(value);
            }
        }
    }

    fn output_bitmap(&mut self, gpu: &GpuContext) -> Result<RasterImage> {
        self.stage
            .as_mut()
            .context("filter not initialized before read-back")?
            .rendered_bitmap(gpu)
    }

    fn destroy(&mut self) {
        self.state.enter_destroyed();
        if let Some(mut stage) = self.stage.take() {
            stage.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ParamRange;

    #[test]
    fn test_progress_remaps_into_binding() {
        let mut filter = ShaderFilter::new(
            "brightness",
            ShaderSource::Wgsl(PASSTHROUGH_FS.to_string()),
            vec![ParamBinding::new(
                FilterChannel::Brightness,
                "brightness",
                ParamRange::new(-0.15, 0.15),
                0.5,
            )],
        );
        assert_eq!(filter.bindings[0].value, 0.0);
        filter.set_progress(1.0, FilterChannel::Brightness);
        assert!((filter.bindings[0].value - 0.15).abs() < 1e-6);
        // Unhandled channel is a silent no-op.
        filter.set_progress(0.0, FilterChannel::Saturation);
        assert!((filter.bindings[0].value - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_destroy_without_init_is_safe() {
        let mut filter = ShaderFilter::passthrough();
        filter.destroy();
        assert_eq!(filter.state(), FilterState::Destroyed);
    }
}
