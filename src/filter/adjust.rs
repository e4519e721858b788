//! Color adjustment filters.

use super::stage::ShaderFilter;
use super::{FilterChannel, ParamBinding, ParamRange};
use crate::gpu::ShaderSource;

const BRIGHTNESS_FS: &str = r#"
@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_input: sampler;
struct Params {
    brightness: f32,
}
@group(0) @binding(2) var<uniform> params: Params;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, tex_coords);
    return vec4<f32>(color.rgb + vec3<f32>(params.brightness), color.a);
}
"#;

const CONTRAST_FS: &str = r#"
@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_input: sampler;
struct Params {
    contrast: f32,
}
@group(0) @binding(2) var<uniform> params: Params;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, tex_coords);
    let adjusted = (color.rgb - vec3<f32>(0.5)) * params.contrast + vec3<f32>(0.5);
    return vec4<f32>(adjusted, color.a);
}
"#;

const SATURATION_FS: &str = r#"
@group(0) @binding(0) var t_input: texture_2d<f32>;
@group(0) @binding(1) var s_input: sampler;
struct Params {
    saturation: f32,
}
@group(0) @binding(2) var<uniform> params: Params;

@fragment
fn fs_main(@location(0) tex_coords: vec2<f32>) -> @location(0) vec4<f32> {
    let color = textureSample(t_input, s_input, tex_coords);
    let luminance = dot(color.rgb, vec3<f32>(0.2125, 0.7154, 0.0721));
    let adjusted = mix(vec3<f32>(luminance), color.rgb, params.saturation);
    return vec4<f32>(adjusted, color.a);
}
"#;

const TONE_FS: &str = r#"
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
    let lifted = color.rgb + vec3<f32>(params.brightness);
    let adjusted = (lifted - vec3<f32>(0.5)) * params.contrast + vec3<f32>(0.5);
    return vec4<f32>(adjusted, color.a);
}
"#;

/// Additive brightness offset, progress [0,1] -> [-0.15, 0.15].
pub fn brightness() -> ShaderFilter {
    ShaderFilter::new(
        "brightness",
        ShaderSource::Wgsl(BRIGHTNESS_FS.to_string()),
        vec![ParamBinding::new(
            FilterChannel::Brightness,
            "brightness",
            ParamRange::new(-0.15, 0.15),
            0.5,
        )],
    )
}

/// Contrast multiplier about mid-gray, progress [0,1] -> [0.75, 1.25].
pub fn contrast() -> ShaderFilter {
    ShaderFilter::new(
        "contrast",
        ShaderSource::Wgsl(CONTRAST_FS.to_string()),
        vec![ParamBinding::new(
            FilterChannel::Contrast,
            "contrast",
            ParamRange::new(0.75, 1.25),
            0.5,
        )],
    )
}

/// Saturation mix against luminance, progress [0,1] -> [0.0, 2.0].
pub fn saturation() -> ShaderFilter {
    ShaderFilter::new(
        "saturation",
        ShaderSource::Wgsl(SATURATION_FS.to_string()),
        vec![ParamBinding::new(
            FilterChannel::Saturation,
            "saturation",
            ParamRange::new(0.0, 2.0),
            0.5,
        )],
    )
}

/// Combined brightness + contrast in one pass; updates are routed by
/// channel.
pub fn tone() -> ShaderFilter {
    ShaderFilter::new(
        "tone",
        ShaderSource::Wgsl(TONE_FS.to_string()),
        vec![
            ParamBinding::new(
                FilterChannel::Brightness,
                "brightness",
                ParamRange::new(-0.15, 0.15),
                0.5,
            ),
            ParamBinding::new(
                FilterChannel::Contrast,
                "contrast",
                ParamRange::new(0.75, 1.25),
                0.5,
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    #[test]
    fn test_tone_routes_by_channel() {
        let mut filter = tone();
        filter.set_progress(1.0, FilterChannel::Brightness);
        filter.set_progress(0.0, FilterChannel::Contrast);
        let channels = filter.channels();
        assert_eq!(
            channels,
            vec![FilterChannel::Brightness, FilterChannel::Contrast]
        );
    }

    #[test]
    fn test_neutral_midpoints() {
        // Midpoint progress leaves the image untouched for every adjustment.
        assert_eq!(ParamRange::new(-0.15, 0.15).remap(0.5), 0.0);
        assert_eq!(ParamRange::new(0.75, 1.25).remap(0.5), 1.0);
        assert_eq!(ParamRange::new(0.0, 2.0).remap(0.5), 1.0);
    }
}
