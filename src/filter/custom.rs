//! User-supplied shader filters.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::stage::ShaderFilter;
use super::ParamBinding;
use crate::gpu::ShaderSource;

/// Loads a fragment shader from disk, picking the language by extension
/// (`.wgsl` parses directly, anything else is treated as GLSL).
///
/// The fragment must target the engine's fixed bind interface: input
/// texture at binding 0, sampler at binding 1, optional `Params` uniform
/// block of floats at binding 2, optional auxiliary texture at binding 3.
pub fn load_shader_source(path: impl AsRef<Path>) -> Result<ShaderSource> {
    let path = path.as_ref();
    info!("loading shader from {:?}", path);
    let code = fs::read_to_string(path)
        .with_context(|| format!("failed to read shader {:?}", path))?;
    let source = match path.extension().and_then(|ext| ext.to_str()) {
        Some("wgsl") => ShaderSource::Wgsl(code),
        _ => ShaderSource::Glsl(code),
    };
    Ok(source)
}

/// Wraps an arbitrary fragment source as a filter. Bindings route progress
/// channels onto whatever uniform names the shader declares; names the
/// shader does not declare simply never take effect.
pub fn custom(label: &str, source: ShaderSource, bindings: Vec<ParamBinding>) -> ShaderFilter {
    ShaderFilter::new(label, source, bindings)
}
