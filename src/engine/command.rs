//! Cross-thread mutation commands and the per-frame drained queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::display::DisplayTransform;
use crate::filter::{Filter, FilterChannel};
use crate::raster::RasterImage;

/// A state mutation bound for the rendering thread. Everything that can
/// change engine state from outside lands here; nothing mutates the engine
/// directly.
pub enum Command {
    /// Replace the live input texture with a new source image.
    SetImage(RasterImage),
    /// Replace the live filter. The new filter is initialized and fed the
    /// current input dimensions before the old one is destroyed.
    SetFilter {
        filter: Box<dyn Filter>,
        initial_progress: Option<(f32, FilterChannel)>,
    },
    /// Update a parameter on the live filter.
    SetProgress { value: f32, channel: FilterChannel },
    /// Update the display pan/zoom transform.
    SetTransform(DisplayTransform),
    /// Update the letterbox background color (ARGB packed).
    SetBackground(u32),
}

/// FIFO of pending commands shared between input threads and the rendering
/// thread. Producers append under the mutex; the rendering thread drains the
/// whole queue in one critical section at the start of each frame, so a
/// frame observes either all commands enqueued before it or none of them.
#[derive(Default)]
pub struct CommandQueue {
    pending: Mutex<VecDeque<Command>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: Command) {
        self.pending.lock().unwrap().push_back(command);
    }

    /// Atomically takes every pending command, preserving enqueue order.
    pub fn drain(&self) -> Vec<Command> {
        let mut pending = self.pending.lock().unwrap();
        pending.drain(..).collect()
    }
}

/// Cloneable handle for enqueueing engine mutations from any thread.
#[derive(Clone)]
pub struct EngineProxy {
    queue: Arc<CommandQueue>,
}

impl EngineProxy {
    pub(crate) fn new(queue: Arc<CommandQueue>) -> Self {
        Self { queue }
    }

    pub fn set_input_image(&self, image: RasterImage) {
        self.queue.push(Command::SetImage(image));
    }

    pub fn set_filter(
        &self,
        filter: Box<dyn Filter>,
        initial_progress: Option<(f32, FilterChannel)>,
    ) {
        self.queue.push(Command::SetFilter {
            filter,
            initial_progress,
        });
    }

    pub fn set_progress(&self, value: f32, channel: FilterChannel) {
        self.queue.push(Command::SetProgress { value, channel });
    }

    pub fn set_transform(&self, transform: DisplayTransform) {
        self.queue.push(Command::SetTransform(transform));
    }

    pub fn set_background(&self, argb: u32) {
        self.queue.push(Command::SetBackground(argb));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ShaderFilter;

    #[test]
    fn test_drain_preserves_enqueue_order() {
        let queue = Arc::new(CommandQueue::new());
        let proxy = EngineProxy::new(queue.clone());

        proxy.set_input_image(RasterImage::solid(2, 2, [255, 0, 0, 255]));
        proxy.set_filter(Box::new(ShaderFilter::passthrough()), None);
        proxy.set_progress(0.5, FilterChannel::Brightness);

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert!(matches!(drained[0], Command::SetImage(_)));
        assert!(matches!(drained[1], Command::SetFilter { .. }));
        assert!(matches!(
            drained[2],
            Command::SetProgress {
                value,
                channel: FilterChannel::Brightness,
            } if value == 0.5
        ));
    }

    #[test]
    fn test_drain_empties_the_queue() {
        let queue = Arc::new(CommandQueue::new());
        let proxy = EngineProxy::new(queue.clone());
        proxy.set_background(0xFF00_0000);
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_repeated_swaps_all_survive_in_order() {
        // Earlier swaps still drain in order; later ones supersede on apply.
        let queue = Arc::new(CommandQueue::new());
        let proxy = EngineProxy::new(queue.clone());
        proxy.set_filter(Box::new(ShaderFilter::passthrough()), None);
        proxy.set_filter(Box::new(ShaderFilter::passthrough()), None);
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained
            .iter()
            .all(|c| matches!(c, Command::SetFilter { .. })));
    }
}
