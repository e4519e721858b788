//! Filter composition: ordered chains with recursive flattening.

use anyhow::{Context, Result};

use super::{Filter, FilterChannel, FilterState};
use crate::gpu::GpuContext;
use crate::raster::RasterImage;

enum Node {
    Leaf(Box<dyn Filter>),
    Group(FilterGroup),
}

/// Composes an ordered list of filters into one logical filter.
///
/// Drawing walks the flattened leaf list: the texture produced by leaf `i`
/// becomes the input of leaf `i + 1`, and the last leaf's output is the
/// group's effective texture; the group itself performs no shader work. The
/// flattened list is a derived view over the nested structure, recomputed on
/// every `add_*` so nested groups dissolve into one linear chain at draw
/// time. Init, resize, and destroy propagate recursively to every child.
pub struct FilterGroup {
    label: String,
    state: FilterState,
    children: Vec<Node>,
    /// Depth-first paths to every leaf, recomputed on structural mutation.
    flat: Vec<Vec<usize>>,
    /// Fixed channel -> leaf routing; first leaf claiming a channel wins.
    routes: Vec<(FilterChannel, Vec<usize>)>,
}

impl FilterGroup {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: FilterState::Uninitialized,
            children: Vec::new(),
            flat: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Appends a filter to the chain.
    pub fn add_filter(&mut self, filter: Box<dyn Filter>) {
        self.children.push(Node::Leaf(filter));
        self.recompute_flat();
    }

    /// Appends a nested group to the chain.
    pub fn add_group(&mut self, group: FilterGroup) {
        self.children.push(Node::Group(group));
        self.recompute_flat();
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    /// Number of leaves in the flattened chain.
    pub fn len(&self) -> usize {
        self.flat.len()
    }

    /// Labels of the flattened chain, in draw order.
    pub fn flattened_labels(&self) -> Vec<String> {
        self.flat
            .iter()
            .map(|path| leaf_ref(&self.children, path).label().to_string())
            .collect()
    }

    fn recompute_flat(&mut self) {
        self.flat.clear();
        let mut prefix = Vec::new();
        walk(&self.children, &mut prefix, &mut self.flat);

        self.routes.clear();
        for path in &self.flat {
            for channel in leaf_ref(&self.children, path).channels() {
                if !self.routes.iter().any(|(c, _)| *c == channel) {
                    self.routes.push((channel, path.clone()));
                }
            }
        }
    }
}

fn walk(children: &[Node], prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    for (index, node) in children.iter().enumerate() {
        prefix.push(index);
        match node {
            Node::Leaf(_) => out.push(prefix.clone()),
            Node::Group(group) => walk(&group.children, prefix, out),
        }
        prefix.pop();
    }
}

fn leaf_ref<'a>(children: &'a [Node], path: &[usize]) -> &'a dyn Filter {
    match &children[path[0]] {
        Node::Leaf(filter) => filter.as_ref(),
        Node::Group(group) => leaf_ref(&group.children, &path[1..]),
    }
}

fn leaf_mut<'a>(children: &'a mut [Node], path: &[usize]) -> &'a mut dyn Filter {
    match &mut children[path[0]] {
        Node::Leaf(filter) => filter.as_mut(),
        Node::Group(group) => leaf_mut(&mut group.children, &path[1..]),
    }
}

impl Filter for FilterGroup {
    fn label(&self) -> &str {
        &self.label
    }

    fn state(&self) -> FilterState {
        self.state
    }

    fn channels(&self) -> Vec<FilterChannel> {
        self.routes.iter().map(|(channel, _)| *channel).collect()
    }

    fn ensure_init(&mut self, gpu: &GpuContext) -> Result<()> {
        if !self.state.begin_init()? {
            return Ok(());
        }
        for node in &mut self.children {
            match node {
                Node::Leaf(filter) => filter.ensure_init(gpu)?,
                Node::Group(group) => group.ensure_init(gpu)?,
            }
        }
        Ok(())
    }

    fn on_input_resized(&mut self, gpu: &GpuContext, width: u32, height: u32) -> Result<()> {
        for node in &mut self.children {
            match node {
                Node::Leaf(filter) => filter.on_input_resized(gpu, width, height)?,
                Node::Group(group) => group.on_input_resized(gpu, width, height)?,
            }
        }
        Ok(())
    }

    fn on_view_resized(&mut self, width: u32, height: u32) {
        for node in &mut self.children {
            match node {
                Node::Leaf(filter) => filter.on_view_resized(width, height),
                Node::Group(group) => group.on_view_resized(width, height),
            }
        }
    }

    fn draw_frame(
        &mut self,
        gpu: &GpuContext,
        input: &wgpu::TextureView,
    ) -> Result<Option<wgpu::TextureView>> {
        let mut current: Option<wgpu::TextureView> = None;
        for path in &self.flat {
            let leaf = leaf_mut(&mut self.children, path);
            let leaf_input = current.as_ref().unwrap_or(input);
            if let Some(output) = leaf.draw_frame(gpu, leaf_input)? {
                current = Some(output);
            }
        }
        Ok(current)
    }

    fn set_progress(&mut self, value: f32, channel: FilterChannel) {
        // Unmapped channels are a silent no-op.
        let Some((_, path)) = self.routes.iter().find(|(c, _)| *c == channel) else {
            return;
        };
        leaf_mut(&mut self.children, path).set_progress(value, channel);
    }

    fn output_bitmap(&mut self, gpu: &GpuContext) -> Result<RasterImage> {
        let path = self.flat.last().context("filter group is empty")?;
        leaf_mut(&mut self.children, path).output_bitmap(gpu)
    }

    fn destroy(&mut self) {
        self.state.enter_destroyed();
        for node in &mut self.children {
            match node {
                Node::Leaf(filter) => filter.destroy(),
                Node::Group(group) => group.destroy(),
            }
        }
    }
}

/// Brightness, contrast, and saturation chained behind one channel-routed
/// filter, the usual "adjustments" panel.
pub fn adjust_group() -> FilterGroup {
    let mut group = FilterGroup::new("adjust");
    group.add_filter(Box::new(super::adjust::brightness()));
    group.add_filter(Box::new(super::adjust::contrast()));
    group.add_filter(Box::new(super::adjust::saturation()));
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::adjust;

    use std::sync::{Arc, Mutex};

    type ProgressLog = Arc<Mutex<Vec<(String, f32)>>>;

    struct RecordingFilter {
        label: String,
        channel: FilterChannel,
        state: FilterState,
        log: ProgressLog,
    }

    impl RecordingFilter {
        fn new(label: &str, channel: FilterChannel) -> Self {
            Self::with_log(label, channel, Arc::default())
        }

        fn with_log(label: &str, channel: FilterChannel, log: ProgressLog) -> Self {
            Self {
                label: label.to_string(),
                channel,
                state: FilterState::Uninitialized,
                log,
            }
        }
    }

    impl Filter for RecordingFilter {
        fn label(&self) -> &str {
            &self.label
        }

        fn state(&self) -> FilterState {
            self.state
        }

        fn channels(&self) -> Vec<FilterChannel> {
            vec![self.channel]
        }

        fn ensure_init(&mut self, _gpu: &GpuContext) -> Result<()> {
            self.state.begin_init()?;
            Ok(())
        }

        fn on_input_resized(&mut self, _gpu: &GpuContext, _w: u32, _h: u32) -> Result<()> {
            Ok(())
        }

        fn draw_frame(
            &mut self,
            _gpu: &GpuContext,
            _input: &wgpu::TextureView,
        ) -> Result<Option<wgpu::TextureView>> {
            Ok(None)
        }

        fn set_progress(&mut self, value: f32, channel: FilterChannel) {
            if channel == self.channel {
                self.log.lock().unwrap().push((self.label.clone(), value));
            }
        }

        fn output_bitmap(&mut self, _gpu: &GpuContext) -> Result<RasterImage> {
            Ok(RasterImage::new(1, 1))
        }

        fn destroy(&mut self) {
            self.state.enter_destroyed();
        }
    }

    #[test]
    fn test_flatten_is_depth_first_left_to_right() {
        // group[A, group[B, C], D] flattens to [A, B, C, D].
        let mut inner = FilterGroup::new("inner");
        inner.add_filter(Box::new(RecordingFilter::new("b", FilterChannel::Contrast)));
        inner.add_filter(Box::new(RecordingFilter::new(
            "c",
            FilterChannel::Saturation,
        )));

        let mut outer = FilterGroup::new("outer");
        outer.add_filter(Box::new(RecordingFilter::new(
            "a",
            FilterChannel::Brightness,
        )));
        outer.add_group(inner);
        outer.add_filter(Box::new(RecordingFilter::new(
            "d",
            FilterChannel::BlurRadius,
        )));

        assert_eq!(outer.flattened_labels(), vec!["a", "b", "c", "d"]);
        assert_eq!(outer.len(), 4);
    }

    #[test]
    fn test_progress_routes_to_mapped_child_only() {
        let log: ProgressLog = Arc::default();
        let mut group = FilterGroup::new("chain");
        group.add_filter(Box::new(RecordingFilter::with_log(
            "bright",
            FilterChannel::Brightness,
            log.clone(),
        )));
        group.add_filter(Box::new(RecordingFilter::with_log(
            "contrast",
            FilterChannel::Contrast,
            log.clone(),
        )));

        group.set_progress(0.8, FilterChannel::Contrast);
        // Unmapped channel: silent no-op, not an error.
        group.set_progress(0.3, FilterChannel::LutIntensity);

        assert_eq!(*log.lock().unwrap(), vec![("contrast".to_string(), 0.8)]);
        assert_eq!(
            group.channels(),
            vec![FilterChannel::Brightness, FilterChannel::Contrast]
        );
    }

    #[test]
    fn test_adjust_group_channels() {
        let group = adjust_group();
        assert_eq!(
            group.flattened_labels(),
            vec!["brightness", "contrast", "saturation"]
        );
        assert_eq!(
            group.channels(),
            vec![
                FilterChannel::Brightness,
                FilterChannel::Contrast,
                FilterChannel::Saturation,
            ]
        );
        let _ = adjust::tone();
    }
}
