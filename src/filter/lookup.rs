//! Color lookup-table filter.

use super::stage::ShaderFilter;
use super::{FilterChannel, ParamBinding, ParamRange};
use crate::gpu::ShaderSource;
use crate::raster::RasterImage;

/// Grades through a 512x512 LUT image laid out as an 8x8 grid of 64x64
/// blue-slice tiles. The LUT rides the auxiliary binding and is only live
/// for the duration of the pass.
const LOOKUP_FS: &str = r#"
@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_input: sampler;
struct Params {
    intensity: f32,
}
@group(0) @binding(2) var<uniform> params: Params;
@group(0) @binding(3) var t_lut: texture_2d<f32>;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, tex_coords);
    let blue = clamp(color.b, 0.0, 1.0) * 63.0;

    let quad_low = vec2<f32>(floor(blue) % 8.0, floor(floor(blue) / 8.0));
    let quad_high = vec2<f32>(ceil(blue) % 8.0, floor(ceil(blue) / 8.0));
    let texel = 0.5 / 512.0 + clamp(color.rg, vec2<f32>(0.0), vec2<f32>(1.0)) * (63.0 / 512.0);

    let graded_low = textureSampleLevel(t_lut, s_input, quad_low * 0.125 + texel, 0.0);
    let graded_high = textureSampleLevel(t_lut, s_input, quad_high * 0.125 + texel, 0.0);
    let graded = mix(graded_low, graded_high, fract(blue));
    return mix(color, vec4<f32>(graded.rgb, color.a), params.intensity);
}
"#;

/// LUT grade with intensity mix, progress [0,1] -> [0.0, 1.0].
pub fn lookup(lut: RasterImage) -> ShaderFilter {
    ShaderFilter::new(
        "lookup",
        ShaderSource::Wgsl(LOOKUP_FS.to_string()),
        vec![ParamBinding::new(
            FilterChannel::LutIntensity,
            "intensity",
            ParamRange::new(0.0, 1.0),
            1.0,
        )],
    )
    .with_aux(lut)
}
