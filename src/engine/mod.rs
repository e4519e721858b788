//! The render engine: live filter, live input texture, and the per-frame
//! command drain.

mod command;
mod display;
mod offscreen;

pub use command::{Command, CommandQueue, EngineProxy};
pub use display::{argb_to_color, compose_mvp, fit_scale, DisplayTarget, DisplayTransform};
pub use offscreen::{render_still, OffscreenRenderContext};

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::debug;

use crate::filter::Filter;
use crate::gpu::{GpuContext, Texture};
use crate::raster::RasterImage;

/// Owns the GPU context, the live filter, and the live input texture, and
/// serializes every outside mutation through a FIFO command queue drained
/// once per rendered frame.
///
/// All methods run on the thread that owns the GPU context. Other threads
/// interact exclusively through [`EngineProxy`].
pub struct RenderEngine {
    gpu: GpuContext,
    queue: Arc<CommandQueue>,
    filter: Option<Box<dyn Filter>>,
    input: Option<Texture>,
    input_size: Option<(u32, u32)>,
    transform: DisplayTransform,
    background: wgpu::Color,
    display: Option<DisplayTarget>,
}

impl RenderEngine {
    pub fn new(gpu: GpuContext, display: Option<DisplayTarget>) -> Self {
        Self {
            gpu,
            queue: Arc::new(CommandQueue::new()),
            filter: None,
            input: None,
            input_size: None,
            transform: DisplayTransform::default(),
            background: wgpu::Color::BLACK,
            display,
        }
    }

    /// Handle for enqueueing mutations from any thread.
    pub fn proxy(&self) -> EngineProxy {
        EngineProxy::new(self.queue.clone())
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Applies every pending command in enqueue order.
    pub fn drain_commands(&mut self) -> Result<()> {
        for command in self.queue.drain() {
            self.apply(command)?;
        }
        Ok(())
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::SetImage(image) => {
                let texture = Texture::from_raster(&self.gpu, &image);
                let size = (image.width, image.height);
                self.input_size = Some(size);
                if let Some(mut old) = self.input.replace(texture) {
                    old.delete();
                }
                if let Some(filter) = &mut self.filter {
                    filter.on_input_resized(&self.gpu, size.0, size.1)?;
                }
            }
            Command::SetFilter {
                mut filter,
                initial_progress,
            } => {
                // The incoming filter is fully initialized (with the current
                // input dimensions) before the outgoing one is destroyed, so
                // no frame renders against a filter without framebuffers.
                filter.ensure_init(&self.gpu)?;
                if let Some((width, height)) = self.input_size {
                    filter.on_input_resized(&self.gpu, width, height)?;
                }
                if let Some(display) = &self.display {
                    let (width, height) = display.size();
                    filter.on_view_resized(width, height);
                }
                if let Some((value, channel)) = initial_progress {
                    filter.set_progress(value, channel);
                }
                if let Some(mut old) = self.filter.replace(filter) {
                    old.destroy();
                }
            }
            Command::SetProgress { value, channel } => {
                if let Some(filter) = &mut self.filter {
                    filter.set_progress(value, channel);
                }
            }
            Command::SetTransform(transform) => {
                self.transform = transform;
            }
            Command::SetBackground(argb) => {
                self.background = argb_to_color(argb);
            }
        }
        Ok(())
    }

    /// Reconfigures the output surface and tells the live filter about the
    /// new view size.
    pub fn resize_view(&mut self, width: u32, height: u32) {
        if let Some(display) = &mut self.display {
            display.resize(&self.gpu, width, height);
        }
        if let Some(filter) = &mut self.filter {
            filter.on_view_resized(width, height);
        }
    }

    /// Drains pending commands, runs the live filter over the live input,
    /// and blits the result to the display surface.
    pub fn render_frame(&mut self) -> Result<()> {
        let start = Instant::now();
        self.drain_commands()?;

        let Some(input) = &mut self.input else {
            return Ok(());
        };
        let input_view = input.view(&self.gpu);

        let frame_view = match &mut self.filter {
            Some(filter) => filter
                .draw_frame(&self.gpu, &input_view)?
                .unwrap_or(input_view),
            None => input_view,
        };

        if let Some(display) = &mut self.display {
            let input_size = self.input_size.unwrap_or((1, 1));
            let mvp = compose_mvp(&self.transform, input_size, display.size());
            display.present(&self.gpu, &frame_view, mvp, self.background)?;
        }

        debug!("frame rendered in {:?}", start.elapsed());
        Ok(())
    }

    /// Synchronously reads back the live filter's final framebuffer. Must be
    /// called after a completed frame; the output of a filter that never
    /// drew is a blank image.
    pub fn rendered_output(&mut self) -> Result<RasterImage> {
        let filter = self
            .filter
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no live filter to read back"))?;
        filter.output_bitmap(&self.gpu)
    }

    /// Tears down the live filter and input texture.
    pub fn shutdown(&mut self) {
        if let Some(mut filter) = self.filter.take() {
            filter.destroy();
        }
        if let Some(mut input) = self.input.take() {
            input.delete();
        }
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
