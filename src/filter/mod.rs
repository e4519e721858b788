//! Image filters: the polymorphic unit of the pipeline.

pub mod adjust;
pub mod blur;
pub mod custom;
pub mod group;
pub mod lookup;
pub mod stage;

pub use blur::GaussianBlurFilter;
pub use group::FilterGroup;
pub use stage::ShaderFilter;

use anyhow::{bail, Result};

use crate::gpu::GpuContext;
use crate::raster::RasterImage;

/// Filter lifecycle. A destroyed filter is never re-initialized; build a
/// fresh one instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Uninitialized,
    Initialized,
    Destroyed,
}

impl FilterState {
    /// Attempts the Uninitialized -> Initialized transition. Returns `true`
    /// when initialization should run now, `false` when it already happened,
    /// and an error for a destroyed filter.
    pub fn begin_init(&mut self) -> Result<bool> {
        match self {
            FilterState::Uninitialized => {
                *self = FilterState::Initialized;
                Ok(true)
            }
            FilterState::Initialized => Ok(false),
            FilterState::Destroyed => bail!("destroyed filter cannot be re-initialized"),
        }
    }

    /// Moves to Destroyed from any state.
    pub fn enter_destroyed(&mut self) {
        *self = FilterState::Destroyed;
    }
}

/// Selects which parameter a multi-parameter filter updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterChannel {
    Brightness,
    Contrast,
    Saturation,
    BlurRadius,
    LutIntensity,
}

/// Linear remap from normalized progress to a physical parameter range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub start: f32,
    pub end: f32,
}

impl ParamRange {
    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// `start + (end - start) * value`, with `value` normalized to [0, 1].
    pub fn remap(&self, value: f32) -> f32 {
        self.start + (self.end - self.start) * value
    }
}

/// Binds a progress channel to a shader uniform with its physical range.
#[derive(Debug, Clone)]
pub struct ParamBinding {
    pub channel: FilterChannel,
    pub uniform: String,
    pub range: ParamRange,
    pub value: f32,
}

impl ParamBinding {
    /// Binding whose initial value sits at the given normalized progress.
    pub fn new(channel: FilterChannel, uniform: &str, range: ParamRange, progress: f32) -> Self {
        Self {
            channel,
            uniform: uniform.to_string(),
            range,
            value: range.remap(progress),
        }
    }
}

/// A single- or multi-pass image transform.
///
/// Lifecycle: `ensure_init` runs once, lazily, inside a GPU context;
/// `destroy` releases every owned GPU resource and ends the filter's life.
/// `draw_frame` consumes the input texture and yields the filter's output
/// texture view (or `None` when the filter produced nothing, e.g. an empty
/// group). `set_progress` is the single mutation entry point for every
/// user-tunable parameter; values are pre-normalized to [0, 1] and channels
/// a filter does not handle are silently ignored.
pub trait Filter: Send {
    fn label(&self) -> &str;

    fn state(&self) -> FilterState;

    /// Channels this filter responds to; groups route by these.
    fn channels(&self) -> Vec<FilterChannel>;

    /// Idempotent lazy initialization. Errors on a destroyed filter.
    fn ensure_init(&mut self, gpu: &GpuContext) -> Result<()>;

    /// (Re)allocates off-screen framebuffers for a new input size,
    /// discarding the old ones.
    fn on_input_resized(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()>;

    /// View size only affects the final screen-blit aspect computation,
    /// never the off-screen processing size.
    fn on_view_resized(&mut self, _width: u32, _height: u32) {}

    /// Runs the filter's passes over `input`, returning the output view.
    fn draw_frame(
        &mut self,
        gpu: &GpuContext,
        input: &wgpu::TextureView,
    ) -> Result<Option<wgpu::TextureView>>;

    fn set_progress(&mut self, value: f32, channel: FilterChannel);

    /// Synchronously reads back the filter's final framebuffer.
    fn output_bitmap(&mut self, gpu: &GpuContext) -> Result<RasterImage>;

    /// Releases every owned GPU resource. The filter must not be used after.
    fn destroy(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_init_runs_exactly_once() {
        let mut state = FilterState::Uninitialized;
        assert!(state.begin_init().unwrap());
        assert_eq!(state, FilterState::Initialized);
        assert!(!state.begin_init().unwrap());
        assert_eq!(state, FilterState::Initialized);
    }

    #[test]
    fn test_destroyed_filter_is_not_reusable() {
        let mut state = FilterState::Initialized;
        state.enter_destroyed();
        assert!(state.begin_init().is_err());
        assert_eq!(state, FilterState::Destroyed);
    }

    #[test]
    fn test_remap_endpoints_and_midpoint() {
        let range = ParamRange::new(-0.15, 0.15);
        assert_eq!(range.remap(0.0), -0.15);
        assert_eq!(range.remap(1.0), 0.15);
        assert_eq!(range.remap(0.5), 0.0);
    }

    #[test]
    fn test_remap_documented_ranges() {
        assert_eq!(ParamRange::new(0.75, 1.25).remap(0.5), 1.0);
        assert_eq!(ParamRange::new(0.0, 2.0).remap(0.25), 0.5);
        assert_eq!(ParamRange::new(0.0, 8.0).remap(1.0), 8.0);
    }
}
