//! Headless one-shot rendering for still export.

use anyhow::{bail, Result};
use tracing::{error, info};

use crate::filter::Filter;
use crate::gpu::{GpuContext, Texture};
use crate::raster::RasterImage;

/// A throwaway headless context sized to a source image. Export renders at
/// the source's full resolution without touching (or depending on) any live
/// display surface; every GPU resource it stands up dies with its scope.
pub struct OffscreenRenderContext {
    gpu: GpuContext,
    width: u32,
    height: u32,
}

impl OffscreenRenderContext {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let gpu = GpuContext::headless()?;
        let max_dimension = gpu.max_texture_dimension();
        if width > max_dimension || height > max_dimension {
            bail!(
                "source {}x{} exceeds the adapter's max texture dimension {}",
                width,
                height,
                max_dimension
            );
        }
        Ok(Self { gpu, width, height })
    }

    /// Runs one filter's full lifecycle over the source and reads back the
    /// result. The filter arrives uninitialized and leaves rendered; the
    /// caller owns its destruction.
    pub fn render_filter(
        &self,
        filter: &mut dyn Filter,
        source: &RasterImage,
    ) -> Result<RasterImage> {
        let mut input = Texture::from_raster(&self.gpu, source);
        let result = self.run(filter, &mut input);
        input.delete();
        result
    }

    fn run(&self, filter: &mut dyn Filter, input: &mut Texture) -> Result<RasterImage> {
        filter.ensure_init(&self.gpu)?;
        filter.on_input_resized(&self.gpu, self.width, self.height)?;
        filter.on_view_resized(self.width, self.height);
        let input_view = input.view(&self.gpu);
        filter.draw_frame(&self.gpu, &input_view)?;
        filter.output_bitmap(&self.gpu)
    }
}

/// Renders `source` through `filter` headlessly and returns the result.
///
/// This is the export boundary: the filter is destroyed and the context torn
/// down whether rendering succeeded or failed, and failures are logged
/// before being surfaced to the host.
pub fn render_still(mut filter: Box<dyn Filter>, source: &RasterImage) -> Result<RasterImage> {
    info!(
        "rendering still export at {}x{} through '{}'",
        source.width,
        source.height,
        filter.label()
    );
    let result = OffscreenRenderContext::new(source.width, source.height)
        .and_then(|context| context.render_filter(filter.as_mut(), source));
    filter.destroy();
    if let Err(err) = &result {
        error!("still export failed: {err:#}");
    }
    result
}
