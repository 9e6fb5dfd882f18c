//! Engine facade
//!
//! `FluidEngine` owns every GPU resource of one backdrop instance. Hosts call
//! the intent methods (`resize`, `feed_pointer`, `set_mask`) from their event
//! handlers at any time; the intent is queued and applied at the start of the
//! next `tick`, which the host calls from its display-refresh callback.

use std::time::Duration;

use crate::config::SimulationConfig;
use crate::error::{FluidError, FluidResult};
use crate::gpu::backend::RenderBackend;
use crate::input::{InputController, PointerEvent, PointerPhase};
use crate::present::{Compositor, FramePacer, FrameStats, MaskImage, Presented};
use crate::shaders::{ProgramKind, ShaderKeywords, ShaderRegistry};
use crate::sim::{FrameClock, SimulationStepper, StepReport};
use crate::targets::{FieldLayout, FieldSet, RenderTargetPool};

/// Callback fired once after the first executed frame.
pub type ReadyCallback = Box<dyn FnOnce()>;

/// What a call to [`FluidEngine::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// The engine was stopped; nothing ran.
    Stopped,
    /// The frame cap has not elapsed since the last executed frame.
    Skipped,
    Rendered {
        dt: f32,
        splats: usize,
        presented: Presented,
        report: StepReport,
    },
}

pub struct FluidEngine<B: RenderBackend> {
    backend: B,
    config: SimulationConfig,
    registry: ShaderRegistry,
    pool: RenderTargetPool,
    fields: Option<FieldSet>,
    stepper: SimulationStepper,
    input: InputController,
    compositor: Compositor,
    clock: FrameClock,
    pacer: FramePacer,
    stats: FrameStats,
    pending_resize: Option<(u32, u32)>,
    pending_mask: Option<Option<MaskImage>>,
    on_ready: Option<ReadyCallback>,
    running: bool,
}

impl<B: RenderBackend> FluidEngine<B> {
    /// Allocate fields and compile programs on `backend`.
    ///
    /// The config is validated and then degraded to what the backend's
    /// capability profile supports. Errors here are the only ones a host has
    /// to handle up front.
    pub fn start(
        mut backend: B,
        config: SimulationConfig,
        on_ready: Option<ReadyCallback>,
    ) -> FluidResult<Self> {
        config.validate()?;
        let mut config = config;
        let profile = *backend.capabilities();
        config.apply_capabilities(&profile);

        let (width, height) = backend.surface_size();
        let layout = FieldLayout::derive(&config, &profile, width, height);
        let mut pool = RenderTargetPool::new();
        let fields = pool.create_fields(&mut backend, &layout)?;

        let stepper = SimulationStepper::new(&profile);
        let mut registry = ShaderRegistry::new();
        Self::warm_up(&mut backend, &mut registry, &stepper, &config);

        let mut input = InputController::from_config(&config);
        input.set_surface_size(width, height);

        log::info!(
            "[FluidEngine::start] {}x{} surface, sim {:?}, dye {:?}, {} storage",
            width,
            height,
            fields.sim_size(),
            fields.dye_size(),
            profile.storage.name()
        );

        Ok(Self {
            backend,
            pacer: FramePacer::new(config.target_fps),
            config,
            registry,
            pool,
            fields: Some(fields),
            stepper,
            input,
            compositor: Compositor::new(),
            clock: FrameClock::default(),
            stats: FrameStats::new(),
            pending_resize: None,
            pending_mask: None,
            on_ready,
            running: true,
        })
    }

    /// Build every variant the session will draw with so failures are logged
    /// before the first frame.
    fn warm_up(
        backend: &mut B,
        registry: &mut ShaderRegistry,
        stepper: &SimulationStepper,
        config: &SimulationConfig,
    ) {
        let mut display = ShaderKeywords::empty();
        display.set(ShaderKeywords::SHADING, config.shading);

        for kind in ProgramKind::ALL {
            let keywords = match kind {
                ProgramKind::Advection => stepper.advection_keywords(),
                ProgramKind::Display => display,
                _ => ShaderKeywords::empty(),
            };
            registry.program(backend, kind, keywords);
        }
    }

    /// Release every GPU resource. Later ticks return [`FrameOutcome::Stopped`].
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        if let Some(fields) = self.fields.take() {
            self.pool.release_fields(&mut self.backend, fields);
        }
        self.registry.release_all(&mut self.backend);
        self.backend.clear_mask();
        self.on_ready = None;
        self.pending_resize = None;
        self.pending_mask = None;

        log::info!(
            "[FluidEngine::stop] Stopped after {} frames",
            self.stats.executed_frames()
        );
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Queue a resize to a logical size at a device pixel ratio.
    pub fn resize(&mut self, logical_width: f32, logical_height: f32, device_pixel_ratio: f32) {
        let size = self
            .config
            .surface_pixels(logical_width, logical_height, device_pixel_ratio);
        self.pending_resize = Some(size);
    }

    /// Queue a resize to a size already in physical pixels.
    pub fn resize_pixels(&mut self, width: u32, height: u32) {
        self.pending_resize = Some((width.max(1), height.max(1)));
    }

    /// Queue pointer input in surface pixel coordinates.
    pub fn feed_pointer(&mut self, id: i64, x: f32, y: f32, phase: PointerPhase) {
        if self.running {
            self.input.feed(PointerEvent::new(id, x, y, phase));
        }
    }

    /// Queue a new mask, or `None` to go back to plain dye.
    pub fn set_mask(&mut self, mask: Option<MaskImage>) {
        self.pending_mask = Some(mask);
    }

    /// Run one frame at host time `now`.
    ///
    /// Recoverable failures are logged and the frame continues without the
    /// failed pass. Only a lost context or missing device is returned.
    pub fn tick(&mut self, now: Duration) -> FluidResult<FrameOutcome> {
        if !self.running {
            return Ok(FrameOutcome::Stopped);
        }
        if !self.pacer.should_run(now) {
            self.stats.record_skip();
            return Ok(FrameOutcome::Skipped);
        }

        let dt = self.clock.advance(now);
        let outcome = match self.run_frame(dt) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("[FluidEngine::tick] Frame aborted: {}", e);
                return Err(e);
            }
        };

        if let Some(on_ready) = self.on_ready.take() {
            log::debug!("[FluidEngine::tick] First frame done");
            on_ready();
        }

        self.stats.record_frame(now);
        if self.stats.should_log() {
            self.stats.log_summary(self.config.target_fps);
        }
        Ok(outcome)
    }

    fn run_frame(&mut self, dt: f32) -> FluidResult<FrameOutcome> {
        self.apply_pending()?;

        let splats = self.input.process(dt, &self.config);
        let fields = self.fields.as_mut().ok_or(FluidError::ContextLost)?;

        let mut report = StepReport::default();
        for splat in &splats {
            let splat_report = self.stepper.splat(
                &mut self.backend,
                &mut self.registry,
                fields,
                &self.config,
                splat,
            )?;
            report.merge(splat_report);
        }
        report.merge(self.stepper.step(
            &mut self.backend,
            &mut self.registry,
            fields,
            &self.config,
            dt,
        )?);
        for _ in 0..report.passes_skipped {
            self.stats.record_failed_pass();
        }

        let presented = match self.compositor.present(
            &mut self.backend,
            &mut self.registry,
            fields,
            &self.config,
        ) {
            Ok(presented) => presented,
            Err(e) if e.is_recoverable() => {
                log::warn!("[FluidEngine::run_frame] Presentation skipped: {}", e);
                self.stats.record_failed_pass();
                Presented::Nothing
            }
            Err(e) => return Err(e),
        };

        match self.backend.end_frame() {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                log::warn!("[FluidEngine::run_frame] End of frame failed: {}", e);
            }
            Err(e) => return Err(e),
        }

        Ok(FrameOutcome::Rendered {
            dt,
            splats: splats.len(),
            presented,
            report,
        })
    }

    fn apply_pending(&mut self) -> FluidResult<()> {
        if let Some((width, height)) = self.pending_resize.take() {
            self.apply_resize(width, height)?;
        }

        if let Some(mask) = self.pending_mask.take() {
            match mask {
                Some(mask) => match self.backend.upload_mask(&mask) {
                    Ok(()) => self.compositor.set_mask_aspect(Some(mask.aspect())),
                    Err(e) if e.is_recoverable() => {
                        log::warn!("[FluidEngine::apply_pending] Mask upload failed: {}", e);
                    }
                    Err(e) => return Err(e),
                },
                None => {
                    self.backend.clear_mask();
                    self.compositor.set_mask_aspect(None);
                }
            }
        }
        Ok(())
    }

    fn apply_resize(&mut self, width: u32, height: u32) -> FluidResult<()> {
        let layout = FieldLayout::derive(&self.config, self.backend.capabilities(), width, height);
        let unchanged = self.backend.surface_size() == (width, height)
            && self.fields.as_ref().map_or(false, |fields| {
                fields.sim_size() == (layout.velocity.width, layout.velocity.height)
                    && fields.dye_size() == (layout.dye.width, layout.dye.height)
            });
        if unchanged {
            return Ok(());
        }

        self.backend.resize_surface(width, height)?;
        self.input.set_surface_size(width, height);
        let fields = self.fields.as_mut().ok_or(FluidError::ContextLost)?;

        match self
            .pool
            .resize_fields(&mut self.backend, &mut self.registry, fields, &layout)
        {
            Ok(()) => {
                log::info!("[FluidEngine::apply_resize] Surface {}x{}", width, height);
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                log::warn!(
                    "[FluidEngine::apply_resize] Keeping sim {:?}, dye {:?} for {}x{}: {}",
                    fields.sim_size(),
                    fields.dye_size(),
                    width,
                    height,
                    e
                );
                Ok(())
            }
            Err(e) => {
                log::error!("[FluidEngine::apply_resize] Field reallocation failed: {}", e);
                Err(e)
            }
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// `None` once the engine has stopped.
    pub fn fields(&self) -> Option<&FieldSet> {
        self.fields.as_ref()
    }

    /// The session config after capability degradation.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn stepper(&self) -> &SimulationStepper {
        &self.stepper
    }

    pub fn registry(&self) -> &ShaderRegistry {
        &self.registry
    }

    pub fn live_targets(&self) -> usize {
        self.pool.live_targets()
    }
}

impl<B: RenderBackend> Drop for FluidEngine<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::capability::CapabilityProfile;
    use crate::gpu::cpu_backend::CpuBackend;
    use std::cell::Cell;
    use std::rc::Rc;

    fn config() -> SimulationConfig {
        SimulationConfig {
            sim_resolution: 16,
            dye_resolution: 32,
            target_fps: 0.0,
            seed: Some(7),
            ..SimulationConfig::default()
        }
    }

    fn engine() -> FluidEngine<CpuBackend> {
        let backend = CpuBackend::new(64, 64, CapabilityProfile::half_float());
        FluidEngine::start(backend, config(), None).unwrap()
    }

    #[test]
    fn test_start_compiles_every_program() {
        let engine = engine();
        assert_eq!(engine.registry().len(), ProgramKind::ALL.len());
        assert_eq!(engine.live_targets(), 8);
    }

    #[test]
    fn test_invalid_config_fails_start() {
        let backend = CpuBackend::new(64, 64, CapabilityProfile::half_float());
        let bad = SimulationConfig {
            splat_radius: 0.0,
            ..config()
        };
        assert!(matches!(
            FluidEngine::start(backend, bad, None),
            Err(FluidError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_on_ready_fires_once() {
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        let backend = CpuBackend::new(64, 64, CapabilityProfile::half_float());
        let mut engine = FluidEngine::start(
            backend,
            config(),
            Some(Box::new(move || counter.set(counter.get() + 1))),
        )
        .unwrap();

        assert_eq!(fired.get(), 0);
        engine.tick(Duration::from_millis(0)).unwrap();
        engine.tick(Duration::from_millis(16)).unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_first_frame_has_zero_dt() {
        let mut engine = engine();
        match engine.tick(Duration::from_secs(10)).unwrap() {
            FrameOutcome::Rendered { dt, presented, .. } => {
                assert_eq!(dt, 0.0);
                assert_eq!(presented, Presented::Dye);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(engine.backend().frames_presented(), 1);
    }

    #[test]
    fn test_pacer_skips_early_frames() {
        let backend = CpuBackend::new(64, 64, CapabilityProfile::half_float());
        let capped = SimulationConfig {
            target_fps: 35.0,
            ..config()
        };
        let mut engine = FluidEngine::start(backend, capped, None).unwrap();

        assert!(matches!(
            engine.tick(Duration::from_millis(0)).unwrap(),
            FrameOutcome::Rendered { .. }
        ));
        assert_eq!(
            engine.tick(Duration::from_millis(10)).unwrap(),
            FrameOutcome::Skipped
        );
        assert!(matches!(
            engine.tick(Duration::from_millis(30)).unwrap(),
            FrameOutcome::Rendered { .. }
        ));
        assert_eq!(engine.stats().skipped_frames(), 1);
    }

    #[test]
    fn test_resize_applied_on_next_tick() {
        let mut engine = engine();
        engine.resize(128.0, 64.0, 2.0);
        assert_eq!(engine.backend().surface_size(), (64, 64));

        engine.tick(Duration::ZERO).unwrap();
        // Pixel ratio is clamped to 1.0 by default
        assert_eq!(engine.backend().surface_size(), (128, 64));
        let fields = engine.fields().unwrap();
        assert_eq!(fields.sim_size(), (32, 16));
        assert_eq!(engine.live_targets(), 8);
        assert_eq!(engine.backend().live_targets(), 8);
    }

    #[test]
    fn test_stop_releases_everything_and_is_idempotent() {
        let mut engine = engine();
        engine.tick(Duration::ZERO).unwrap();
        engine.stop();
        engine.stop();

        assert!(!engine.is_running());
        assert_eq!(engine.backend().live_targets(), 0);
        assert!(engine.backend().compiled_programs().is_empty());
        assert_eq!(
            engine.tick(Duration::from_secs(1)).unwrap(),
            FrameOutcome::Stopped
        );
    }

    #[test]
    fn test_mask_switches_presentation() {
        let mut engine = engine();
        let mask = MaskImage::from_rgba8(2, 2, vec![255; 16]).unwrap();
        engine.set_mask(Some(mask));
        match engine.tick(Duration::ZERO).unwrap() {
            FrameOutcome::Rendered { presented, .. } => assert_eq!(presented, Presented::Mask),
            other => panic!("unexpected outcome {:?}", other),
        }

        engine.set_mask(None);
        match engine.tick(Duration::from_millis(16)).unwrap() {
            FrameOutcome::Rendered { presented, .. } => assert_eq!(presented, Presented::Dye),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_failed_display_program_keeps_loop_running() {
        let mut backend = CpuBackend::new(64, 64, CapabilityProfile::half_float());
        backend.fail_program(ProgramKind::Display);
        let mut engine = FluidEngine::start(backend, config(), None).unwrap();

        for frame in 0..3 {
            let outcome = engine.tick(Duration::from_millis(frame * 16)).unwrap();
            assert!(matches!(
                outcome,
                FrameOutcome::Rendered {
                    presented: Presented::Nothing,
                    ..
                }
            ));
        }
        assert_eq!(engine.backend().frames_presented(), 0);
    }
}
