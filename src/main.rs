//! Native backdrop demo
//!
//! Opens a transparent window and runs the fluid behind it. Usage:
//!
//! ```text
//! fluid-backdrop [--config backdrop.toml] [--mask logo.png]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use winit::dpi::{LogicalSize, PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, TouchPhase, WindowEvent};
use winit::event_loop::EventLoop;
use winit::window::WindowBuilder;

use fluid_backdrop::constants::splat::AMBIENT_POINTER_ID;
use fluid_backdrop::{
    DeviceHints, FluidEngine, MaskImage, PointerPhase, SimulationConfig, WgpuBackend,
};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    mask: Option<PathBuf>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Args::default();
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
                "--mask" => args.mask = Some(iter.next().context("--mask needs a path")?.into()),
                other => bail!("unknown argument '{}'", other),
            }
        }
        Ok(args)
    }
}

/// Converts window pixels to surface pixels once `max_pixel_ratio` caps the
/// surface below the window's own density.
#[derive(Debug, Clone, Copy)]
struct Viewport {
    scale_factor: f64,
    pixel_ratio: f32,
}

impl Viewport {
    fn new(config: &SimulationConfig, scale_factor: f64) -> Self {
        Self {
            scale_factor,
            pixel_ratio: config.pixel_ratio(scale_factor as f32),
        }
    }

    fn surface_size(&self, config: &SimulationConfig, size: PhysicalSize<u32>) -> (u32, u32) {
        let logical: LogicalSize<f32> = size.to_logical(self.scale_factor);
        config.surface_pixels(logical.width, logical.height, self.scale_factor as f32)
    }

    fn surface_position(&self, position: PhysicalPosition<f64>) -> (f32, f32) {
        let logical = position.to_logical::<f32>(self.scale_factor);
        (logical.x * self.pixel_ratio, logical.y * self.pixel_ratio)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse()?;
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Fluid Backdrop")
            .with_transparent(true)
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)?,
    );
    let size = window.inner_size();
    let scale_factor = window.scale_factor();

    let config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => {
            let logical_width = size.to_logical::<f64>(scale_factor).width as u32;
            let tier = DeviceHints::detect_native(logical_width).tier();
            log::info!("[main] Device tier {:?}", tier);
            SimulationConfig::for_tier(tier)
        }
    };

    let mut viewport = Viewport::new(&config, scale_factor);
    let (surface_width, surface_height) = viewport.surface_size(&config, size);
    log::info!(
        "[main] Window {}x{} at scale {}, surface {}x{}",
        size.width,
        size.height,
        scale_factor,
        surface_width,
        surface_height
    );

    let surface_window = window.clone();
    let mut engine: FluidEngine<WgpuBackend> = pollster::block_on(fluid_backdrop::start_wgpu(
        move || wgpu::SurfaceTarget::from(surface_window.clone()),
        surface_width,
        surface_height,
        config,
        Some(Box::new(|| log::info!("[main] First frame presented"))),
    ))?;

    if let Some(path) = &args.mask {
        engine.set_mask(Some(MaskImage::load(path)?));
    }

    let started = Instant::now();
    let mut cursor = (0.0f32, 0.0f32);

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
            WindowEvent::CloseRequested => {
                engine.stop();
                elwt.exit();
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                viewport = Viewport::new(engine.config(), scale_factor);
                let (width, height) = viewport.surface_size(engine.config(), window.inner_size());
                engine.resize_pixels(width, height);
            }
            WindowEvent::Resized(size) => {
                let logical: LogicalSize<f32> = size.to_logical(viewport.scale_factor);
                engine.resize(logical.width, logical.height, viewport.scale_factor as f32);
            }
            WindowEvent::CursorMoved { position, .. } => {
                cursor = viewport.surface_position(position);
                engine.feed_pointer(AMBIENT_POINTER_ID, cursor.0, cursor.1, PointerPhase::Move);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let phase = match state {
                    ElementState::Pressed => PointerPhase::Down,
                    ElementState::Released => PointerPhase::Up,
                };
                engine.feed_pointer(AMBIENT_POINTER_ID, cursor.0, cursor.1, phase);
            }
            WindowEvent::Touch(touch) => {
                let phase = match touch.phase {
                    TouchPhase::Started => PointerPhase::Down,
                    TouchPhase::Moved => PointerPhase::Move,
                    TouchPhase::Ended | TouchPhase::Cancelled => PointerPhase::Up,
                };
                let (x, y) = viewport.surface_position(touch.location);
                engine.feed_pointer(touch.id as i64, x, y, phase);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = engine.tick(started.elapsed()) {
                    log::error!("[main] Engine failed: {}", e);
                    engine.stop();
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => window.request_redraw(),
        _ => {}
    })?;

    Ok(())
}
