//! Glaze: GPU image filter pipeline CLI.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use glaze::engine::{render_still, DisplayTarget, EngineProxy, RenderEngine};
use glaze::gpu::GpuContext;
use glaze::preset::{ChainSpec, FilterSpec, PresetWatcher};
use glaze::raster::RasterImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::Key;
use winit::window::{Window, WindowAttributes, WindowId};

/// Apply GPU filter chains to an image, live or headless.
#[derive(Parser, Debug)]
#[command(name = "glaze")]
#[command(about = "Apply GPU shader filter chains to an image")]
struct Args {
    /// Source image file
    #[arg(short, long)]
    input: PathBuf,

    /// YAML preset describing the filter chain (watched for changes in
    /// window mode)
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Inline filter spec(s), e.g. brightness=0.8 blur=0.3
    #[arg(short, long, num_args = 1..)]
    filter: Vec<String>,

    /// Render headlessly and write the result here instead of opening a
    /// window
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Where window-mode snapshots land when pressing 's'
    #[arg(long, default_value = "glaze-output.png")]
    snapshot: PathBuf,

    /// Letterbox background color, ARGB hex (e.g. FF202020)
    #[arg(long)]
    background: Option<String>,

    /// Target frames per second for the preview window
    #[arg(long, default_value = "60")]
    fps: u32,
}

/// Parses an inline `name=progress` filter spec.
fn parse_inline_filter(arg: &str) -> Result<FilterSpec> {
    let (name, progress) = match arg.split_once('=') {
        Some((name, value)) => {
            let progress: f32 = value
                .parse()
                .with_context(|| format!("invalid progress in filter spec '{}'", arg))?;
            (name, progress)
        }
        None => (arg, 0.5),
    };
    if !(0.0..=1.0).contains(&progress) {
        return Err(anyhow!("progress must be in [0, 1], got {}", progress));
    }
    match name {
        "passthrough" => Ok(FilterSpec::Passthrough),
        "brightness" => Ok(FilterSpec::Brightness { progress }),
        "contrast" => Ok(FilterSpec::Contrast { progress }),
        "saturation" => Ok(FilterSpec::Saturation { progress }),
        "blur" => Ok(FilterSpec::Blur { progress }),
        _ => Err(anyhow!(
            "unknown filter '{}' (expected passthrough, brightness, contrast, saturation, or blur)",
            name
        )),
    }
}

fn parse_background(arg: &str) -> Result<u32> {
    let trimmed = arg.trim_start_matches("0x").trim_start_matches('#');
    u32::from_str_radix(trimmed, 16)
        .with_context(|| format!("invalid ARGB background color '{}'", arg))
}

/// Resolves the filter chain from the preset file and/or inline specs.
fn resolve_chain(args: &Args) -> Result<ChainSpec> {
    let mut spec = match &args.preset {
        Some(path) => ChainSpec::load(path)?,
        None => ChainSpec::default(),
    };
    for inline in &args.filter {
        spec.filters.push(parse_inline_filter(inline)?);
    }
    if let Some(background) = &args.background {
        spec.background = Some(parse_background(background)?);
    }
    Ok(spec)
}

/// Application state for the interactive preview window.
struct GlazeApp {
    args: Args,
    source: RasterImage,
    chain: ChainSpec,
    window: Option<Arc<Window>>,
    engine: Option<RenderEngine>,
    proxy: Option<EngineProxy>,
    watcher: Option<PresetWatcher>,
    last_frame_time: Instant,
    frame_duration: Duration,
}

impl GlazeApp {
    fn new(args: Args, source: RasterImage, chain: ChainSpec) -> Self {
        let frame_duration = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
        Self {
            args,
            source,
            chain,
            window: None,
            engine: None,
            proxy: None,
            watcher: None,
            last_frame_time: Instant::now(),
            frame_duration,
        }
    }

    fn initialize(&mut self, window: Arc<Window>) -> Result<()> {
        let (gpu, surface) = GpuContext::for_window(window.clone())?;
        let display = DisplayTarget::new(&gpu, surface, window)?;
        let engine = RenderEngine::new(gpu, Some(display));
        let proxy = engine.proxy();

        proxy.set_input_image(self.source.clone());
        proxy.set_filter(Box::new(self.chain.build()?), None);
        if let Some(background) = self.chain.background {
            proxy.set_background(background);
        }

        self.watcher = self
            .args
            .preset
            .clone()
            .and_then(PresetWatcher::new);
        self.engine = Some(engine);
        self.proxy = Some(proxy);
        info!("render engine initialized");
        Ok(())
    }

    fn tick(&mut self) {
        if let (Some(watcher), Some(proxy)) = (&mut self.watcher, &self.proxy) {
            if let Some(spec) = watcher.check_for_changes() {
                match spec.build() {
                    Ok(chain) => {
                        proxy.set_filter(Box::new(chain), None);
                        if let Some(background) = spec.background {
                            proxy.set_background(background);
                        }
                        self.chain = spec;
                    }
                    Err(e) => error!("preset rebuild failed: {e:#}"),
                }
            }
        }

        if let Some(engine) = &mut self.engine {
            if let Err(e) = engine.render_frame() {
                error!("render error: {e:#}");
            }
        }
    }

    fn snapshot(&mut self) {
        let Some(engine) = &mut self.engine else {
            return;
        };
        match engine.rendered_output() {
            Ok(image) => match image.save(&self.args.snapshot) {
                Ok(()) => info!("saved snapshot to {:?}", self.args.snapshot),
                Err(e) => error!("failed to save snapshot: {e:#}"),
            },
            Err(e) => error!("read-back failed: {e:#}"),
        }
    }
}

impl ApplicationHandler for GlazeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title("Glaze")
            .with_inner_size(PhysicalSize::new(
                self.source.width.min(1600),
                self.source.height.min(900),
            ));

        match event_loop.create_window(window_attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                if let Err(e) = self.initialize(window) {
                    error!("initialization error: {e:#}");
                    event_loop.exit();
                }
            }
            Err(e) => {
                error!("failed to create window: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                info!("window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(engine) = &mut self.engine {
                    engine.resize_view(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && event.logical_key == Key::Character("s".into())
                {
                    self.snapshot();
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                if now.duration_since(self.last_frame_time) >= self.frame_duration {
                    self.tick();
                    self.last_frame_time = now;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let source = RasterImage::open(&args.input)?;
    info!(
        "loaded {:?} at {}x{}",
        args.input, source.width, source.height
    );
    let chain = resolve_chain(&args)?;

    match args.export.clone() {
        Some(path) => run_export_mode(&source, &chain, &path),
        None => run_window_mode(args, source, chain),
    }
}

/// Headless export: render the chain at source resolution and write a file.
fn run_export_mode(source: &RasterImage, chain: &ChainSpec, path: &PathBuf) -> Result<()> {
    let filter = chain.build()?;
    let rendered = render_still(Box::new(filter), source)?;
    rendered.save(path)?;
    info!("exported {:?}", path);
    Ok(())
}

/// Interactive preview window.
fn run_window_mode(args: Args, source: RasterImage, chain: ChainSpec) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GlazeApp::new(args, source, chain);
    event_loop.run_app(&mut app)?;

    Ok(())
}
