//! GPU context acquisition.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use winit::window::Window;

/// Owns the wgpu device and queue every other GPU object hangs off.
///
/// All GPU work must stay on the thread this context was created on; other
/// threads talk to the engine through its command queue only.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Initializes a context for headless/off-screen use.
    pub fn headless() -> Result<Self> {
        let instance = new_instance();
        Self::request(instance, None)
    }

    /// Initializes a context compatible with the given window, returning the
    /// window's surface alongside it.
    pub fn for_window(window: Arc<Window>) -> Result<(Self, wgpu::Surface<'static>)> {
        let instance = new_instance();
        let surface = instance.create_surface(window)?;
        let context = Self::request(instance, Some(&surface))?;
        Ok((context, surface))
    }

    fn request(instance: wgpu::Instance, surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        }))
        .map_err(|e| anyhow!("failed to obtain GPU adapter: {:?}", e))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Glaze Device"),
                required_features: wgpu::Features::empty(),
                required_limits: if surface.is_some() {
                    wgpu::Limits::default()
                } else {
                    wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            },
        ))?;

        Ok(Self {
            device,
            queue,
            instance,
            adapter,
        })
    }

    /// Largest texture edge the adapter will accept.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

fn new_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}
