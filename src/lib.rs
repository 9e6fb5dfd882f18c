//! GPU-resident grid fluid simulator for interactive page backdrops.
//!
//! The engine advects dye through an incompressible velocity field that is
//! stirred by pointer input, then composites the dye (or a mask distorted by
//! the flow) onto a transparent surface. Hosts drive it with
//! [`FluidEngine::tick`] from their display-refresh callback.

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod input;
pub mod present;
pub mod shaders;
pub mod sim;
pub mod targets;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub mod web;

pub use config::{DeviceHints, DeviceTier, PointerMode, SimulationConfig};
pub use engine::{FluidEngine, FrameOutcome, ReadyCallback};
pub use error::{FluidError, FluidErrorContext, FluidResult};
pub use gpu::{CapabilityProfile, CpuBackend, GpuContext, RenderBackend, WgpuBackend};
pub use input::{PointerEvent, PointerPhase, Splat};
pub use present::{MaskImage, Presented};
pub use targets::{DoubleBufferedTarget, FieldSet, RenderTarget, TargetId};

/// Open a wgpu context on `make_target` and start an engine on it.
pub async fn start_wgpu<F>(
    make_target: F,
    width: u32,
    height: u32,
    config: SimulationConfig,
    on_ready: Option<ReadyCallback>,
) -> FluidResult<FluidEngine<WgpuBackend>>
where
    F: Fn() -> wgpu::SurfaceTarget<'static>,
{
    config.validate()?;
    let context = GpuContext::new(make_target, width, height, config.transparent).await?;
    let backend = WgpuBackend::new(context, config.transparent);
    FluidEngine::start(backend, config, on_ready)
}
