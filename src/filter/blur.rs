//! Two-pass separable Gaussian blur.

use anyhow::{Context, Result};

use super::stage::FilterStage;
use super::{Filter, FilterChannel, FilterState, ParamRange};
use crate::gpu::{GpuContext, ShaderSource};
use crate::raster::RasterImage;

/// One-dimensional Gaussian tap loop; the direction comes in as a texel
/// step so the same shader serves both passes. Sigma near zero degenerates
/// to a passthrough instead of dividing by zero.
const BLUR_FS: &str = r#"
@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_input: sampler;
struct Params {
    texel_x: f32,
    texel_y: f32,
    sigma: f32,
}
@group(0) @binding(2) var<uniform> params: Params;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    let center = textureSample(t_input, s_input, tex_coords);
    if (params.sigma < 0.01) {
        return center;
    }
    let dir = vec2<f32>(params.texel_x, params.texel_y);
    var acc = vec3<f32>(0.0);
    var total = 0.0;
    for (var i = -12; i <= 12; i = i + 1) {
        let weight = exp(-f32(i * i) / (2.0 * params.sigma * params.sigma));
        let texel = textureSampleLevel(t_input, s_input, tex_coords + dir * f32(i), 0.0);
        acc = acc + texel.rgb * weight;
        total = total + weight;
    }
    return vec4<f32>(acc / total, center.a);
}
"#;

/// Separable Gaussian blur: a horizontal pre-pass renders into an
/// intermediate framebuffer whose texture then feeds the vertical main
/// pass. Progress [0,1] maps to sigma [0.0, 8.0].
pub struct GaussianBlurFilter {
    state: FilterState,
    horizontal: Option<FilterStage>,
    vertical: Option<FilterStage>,
    range: ParamRange,
    sigma: f32,
}

impl GaussianBlurFilter {
    pub fn new() -> Self {
        Self {
            state: FilterState::Uninitialized,
            horizontal: None,
            vertical: None,
            range: ParamRange::new(0.0, 8.0),
            sigma: 0.0,
        }
    }
}

impl Default for GaussianBlurFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for GaussianBlurFilter {
    fn label(&self) -> &str {
        "gaussian-blur"
    }

    fn state(&self) -> FilterState {
        self.state
    }

    fn channels(&self) -> Vec<FilterChannel> {
        vec![FilterChannel::BlurRadius]
    }

    fn ensure_init(&mut self, gpu: &GpuContext) -> Result<()> {
        if !self.state.begin_init()? {
            return Ok(());
        }
        let fragment = ShaderSource::Wgsl(BLUR_FS.to_string());
        self.horizontal = Some(FilterStage::new(gpu, &fragment)?);
        self.vertical = Some(FilterStage::new(gpu, &fragment)?);
        Ok(())
    }

    fn on_input_resized(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        let horizontal = self
            .horizontal
            .as_mut()
            .context("blur not initialized before resize")?;
        horizontal.resize(gpu, width, height);
        horizontal.set_uniform("texel_x", 1.0 / width as f32);
        horizontal.set_uniform("texel_y", 0.0);

        let vertical = self
            .vertical
            .as_mut()
            .context("blur not initialized before resize")?;
        vertical.resize(gpu, width, height);
        vertical.set_uniform("texel_x", 0.0);
        vertical.set_uniform("texel_y", 1.0 / height as f32);
        Ok(())
    }

    fn draw_frame(
        &mut self,
        gpu: &GpuContext,
        input: &wgpu::TextureView,
    ) -> Result<Option<wgpu::TextureView>> {
        // Pre-pass: horizontal into the intermediate framebuffer, which then
        // substitutes for the original input in the main (vertical) pass.
        let horizontal = self
            .horizontal
            .as_mut()
            .context("blur not initialized before draw")?;
        horizontal.set_uniform("sigma", self.sigma);
        let intermediate = horizontal.render(gpu, input)?;

        let vertical = self
            .vertical
            .as_mut()
            .context("blur not initialized before draw")?;
        vertical.set_uniform("sigma", self.sigma);
        Ok(Some(vertical.render(gpu, &intermediate)?))
    }

    fn set_progress(&mut self, value: f32, channel: FilterChannel) {
        if channel == FilterChannel::BlurRadius {
            self.sigma = self.range.remap(value);
        }
    }

    fn output_bitmap(&mut self, gpu: &GpuContext) -> Result<RasterImage> {
        self.vertical
            .as_mut()
            .context("blur not initialized before read-back")?
            .rendered_bitmap(gpu)
    }

    fn destroy(&mut self) {
        self.state.enter_destroyed();
        if let Some(mut stage) = self.horizontal.take() {
            stage.destroy();
        }
        if let Some(mut stage) = self.vertical.take() {
            stage.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_channel_maps_to_sigma() {
        let mut filter = GaussianBlurFilter::new();
        filter.set_progress(0.5, FilterChannel::BlurRadius);
        assert_eq!(filter.sigma, 4.0);
        filter.set_progress(0.0, FilterChannel::Brightness);
        assert_eq!(filter.sigma, 4.0);
    }
}
