use crate::config::SimulationConfig;
use crate::constants::splat::RADIUS_SCALE;
use crate::constants::gpu::TEXTURE_SLOTS;
use crate::error::FluidResult;
use crate::gpu::backend::{DrawCall, DrawTarget, PassParams, RenderBackend};
use crate::gpu::capability::CapabilityProfile;
use crate::input::Splat;
use crate::shaders::{ProgramHandle, ProgramKind, ShaderKeywords, ShaderRegistry};
use crate::targets::{FieldSet, TargetId, TextureSource};

/// Pass counts for one call into the stepper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepReport {
    pub passes_run: u32,
    pub passes_skipped: u32,
}

impl StepReport {
    fn record(&mut self, ran: bool) {
        if ran {
            self.passes_run += 1;
        } else {
            self.passes_skipped += 1;
        }
    }

    pub fn merge(&mut self, other: StepReport) {
        self.passes_run += other.passes_run;
        self.passes_skipped += other.passes_skipped;
    }
}

/// Splat radius in texture space, widened along x for landscape surfaces.
pub fn correct_radius(radius: f32, aspect_ratio: f32) -> f32 {
    if aspect_ratio > 1.0 {
        radius * aspect_ratio
    } else {
        radius
    }
}

/// Runs the fixed solver pass sequence.
///
/// Every pass reads `read` roles and draws into a `write` role or a single
/// target; double buffers are swapped only after their pass actually ran.
/// A pass whose program is unavailable is skipped and the next pass reads
/// the unchanged field.
#[derive(Debug, Clone)]
pub struct SimulationStepper {
    advection_keywords: ShaderKeywords,
}

impl SimulationStepper {
    pub fn new(profile: &CapabilityProfile) -> Self {
        let mut advection_keywords = ShaderKeywords::empty();
        advection_keywords.set(
            ShaderKeywords::MANUAL_FILTERING,
            !profile.supports_linear_filter,
        );
        Self { advection_keywords }
    }

    pub fn advection_keywords(&self) -> ShaderKeywords {
        self.advection_keywords
    }

    /// Advance the fields by `dt` seconds.
    pub fn step<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ShaderRegistry,
        fields: &mut FieldSet,
        config: &SimulationConfig,
        dt: f32,
    ) -> FluidResult<StepReport> {
        let mut report = StepReport::default();
        let velocity_texel = fields.velocity.texel_size();
        let base = PassParams {
            dt,
            ..PassParams::with_texel(velocity_texel)
        };

        // Curl
        let ran = Self::run_pass(
            backend,
            registry,
            ProgramKind::Curl,
            ShaderKeywords::empty(),
            [Some(fields.velocity.read().attach()), None, None],
            base,
            fields.curl.id(),
        )?;
        report.record(ran);

        // Vorticity confinement
        let ran = Self::run_pass(
            backend,
            registry,
            ProgramKind::Vorticity,
            ShaderKeywords::empty(),
            [
                Some(fields.velocity.read().attach()),
                Some(fields.curl.attach()),
                None,
            ],
            PassParams {
                curl: config.curl,
                ..base
            },
            fields.velocity.write().id(),
        )?;
        if ran {
            fields.velocity.swap();
        }
        report.record(ran);

        // Divergence
        let ran = Self::run_pass(
            backend,
            registry,
            ProgramKind::Divergence,
            ShaderKeywords::empty(),
            [Some(fields.velocity.read().attach()), None, None],
            base,
            fields.divergence.id(),
        )?;
        report.record(ran);

        // Pressure seed
        let ran = Self::run_pass(
            backend,
            registry,
            ProgramKind::Clear,
            ShaderKeywords::empty(),
            [Some(fields.pressure.read().attach()), None, None],
            PassParams {
                value: config.pressure,
                ..base
            },
            fields.pressure.write().id(),
        )?;
        if ran {
            fields.pressure.swap();
        }
        report.record(ran);

        // Jacobi relaxation
        for _ in 0..config.effective_pressure_iterations() {
            let ran = Self::run_pass(
                backend,
                registry,
                ProgramKind::Pressure,
                ShaderKeywords::empty(),
                [
                    Some(fields.pressure.read().attach()),
                    Some(fields.divergence.attach()),
                    None,
                ],
                base,
                fields.pressure.write().id(),
            )?;
            if ran {
                fields.pressure.swap();
            }
            report.record(ran);
        }

        // Projection
        let ran = Self::run_pass(
            backend,
            registry,
            ProgramKind::GradientSubtract,
            ShaderKeywords::empty(),
            [
                Some(fields.pressure.read().attach()),
                Some(fields.velocity.read().attach()),
                None,
            ],
            base,
            fields.velocity.write().id(),
        )?;
        if ran {
            fields.velocity.swap();
        }
        report.record(ran);

        // Velocity self-advection
        let ran = Self::run_pass(
            backend,
            registry,
            ProgramKind::Advection,
            self.advection_keywords,
            [
                Some(fields.velocity.read().attach()),
                Some(fields.velocity.read().attach()),
                None,
            ],
            PassParams {
                dye_texel_size: velocity_texel.to_array(),
                dissipation: config.velocity_dissipation,
                ..base
            },
            fields.velocity.write().id(),
        )?;
        if ran {
            fields.velocity.swap();
        }
        report.record(ran);

        // Dye advection
        let ran = Self::run_pass(
            backend,
            registry,
            ProgramKind::Advection,
            self.advection_keywords,
            [
                Some(fields.velocity.read().attach()),
                Some(fields.dye.read().attach()),
                None,
            ],
            PassParams {
                dye_texel_size: fields.dye.texel_size().to_array(),
                dissipation: config.density_dissipation,
                ..base
            },
            fields.dye.write().id(),
        )?;
        if ran {
            fields.dye.swap();
        }
        report.record(ran);

        log::trace!(
            "[SimulationStepper::step] dt {:.4}, {} passes, {} skipped",
            dt,
            report.passes_run,
            report.passes_skipped
        );
        Ok(report)
    }

    /// Add a Gaussian impulse to velocity and the splat colour to dye.
    pub fn splat<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ShaderRegistry,
        fields: &mut FieldSet,
        config: &SimulationConfig,
        splat: &Splat,
    ) -> FluidResult<StepReport> {
        let mut report = StepReport::default();
        let (surface_w, surface_h) = backend.surface_size();
        let aspect_ratio = surface_w.max(1) as f32 / surface_h.max(1) as f32;

        let base = PassParams {
            point: splat.position.to_array(),
            aspect_ratio,
            radius: correct_radius(config.splat_radius / RADIUS_SCALE, aspect_ratio),
            ..PassParams::with_texel(fields.velocity.texel_size())
        };

        let ran = Self::run_pass(
            backend,
            registry,
            ProgramKind::Splat,
            ShaderKeywords::empty(),
            [Some(fields.velocity.read().attach()), None, None],
            PassParams {
                color: [splat.force.x, splat.force.y, 0.0, 1.0],
                ..base
            },
            fields.velocity.write().id(),
        )?;
        if ran {
            fields.velocity.swap();
        }
        report.record(ran);

        let ran = Self::run_pass(
            backend,
            registry,
            ProgramKind::Splat,
            ShaderKeywords::empty(),
            [Some(fields.dye.read().attach()), None, None],
            PassParams {
                color: [splat.color[0], splat.color[1], splat.color[2], 1.0],
                ..base
            },
            fields.dye.write().id(),
        )?;
        if ran {
            fields.dye.swap();
        }
        report.record(ran);

        Ok(report)
    }

    /// Draw one pass. `Ok(false)` means it was skipped and nothing was written.
    fn run_pass<B: RenderBackend + ?Sized>(
        backend: &mut B,
        registry: &mut ShaderRegistry,
        kind: ProgramKind,
        keywords: ShaderKeywords,
        inputs: [Option<TextureSource>; TEXTURE_SLOTS],
        params: PassParams,
        output: TargetId,
    ) -> FluidResult<bool> {
        let program = match registry.program(backend, kind, keywords) {
            ProgramHandle::Ready(program) => program,
            ProgramHandle::NoOp => return Ok(false),
        };

        let call = DrawCall {
            program,
            inputs,
            params,
            output: DrawTarget::Field(output),
        };
        match backend.draw(&call) {
            Ok(()) => Ok(true),
            Err(e) if e.is_recoverable() => {
                log::warn!("[SimulationStepper::run_pass] '{}' failed: {}", kind.name(), e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::cpu_backend::CpuBackend;
    use crate::targets::{FieldLayout, RenderTargetPool};
    use glam::Vec2;

    fn setup(profile: CapabilityProfile) -> (CpuBackend, ShaderRegistry, FieldSet, SimulationConfig) {
        let config = SimulationConfig {
            sim_resolution: 16,
            dye_resolution: 32,
            ..SimulationConfig::default()
        };
        let mut backend = CpuBackend::new(64, 64, profile);
        let layout = FieldLayout::derive(&config, &profile, 64, 64);
        let fields = RenderTargetPool::new()
            .create_fields(&mut backend, &layout)
            .unwrap();
        (backend, ShaderRegistry::new(), fields, config)
    }

    #[test]
    fn test_pass_count_and_order() {
        let (mut backend, mut registry, mut fields, config) = setup(CapabilityProfile::half_float());
        let stepper = SimulationStepper::new(backend.capabilities());

        let report = stepper
            .step(&mut backend, &mut registry, &mut fields, &config, 0.016)
            .unwrap();
        // curl, vorticity, divergence, seed, 5 Jacobi, projection, 2 advections
        assert_eq!(report.passes_run, 12);
        assert_eq!(report.passes_skipped, 0);
        assert_eq!(backend.draw_count(), 12);
    }

    #[test]
    fn test_manual_filtering_keyword_follows_profile() {
        let native = SimulationStepper::new(&CapabilityProfile::half_float());
        assert!(native.advection_keywords().is_empty());

        let manual = SimulationStepper::new(&CapabilityProfile::half_float().without_linear_filter());
        assert!(manual
            .advection_keywords()
            .contains(ShaderKeywords::MANUAL_FILTERING));
    }

    #[test]
    fn test_skipped_pass_does_not_swap() {
        let (mut backend, mut registry, mut fields, config) = setup(CapabilityProfile::half_float());
        backend.fail_program(ProgramKind::Vorticity);
        let stepper = SimulationStepper::new(backend.capabilities());

        let before = fields.velocity.read().id();
        let report = stepper
            .step(&mut backend, &mut registry, &mut fields, &config, 0.016)
            .unwrap();
        assert_eq!(report.passes_skipped, 1);
        // projection and velocity advection each swap once
        assert_eq!(fields.velocity.read().id(), before);
    }

    #[test]
    fn test_splat_writes_both_fields() {
        let (mut backend, mut registry, mut fields, config) = setup(CapabilityProfile::half_float());
        let stepper = SimulationStepper::new(backend.capabilities());
        let splat = Splat {
            position: Vec2::splat(0.5),
            force: Vec2::new(100.0, 0.0),
            color: [0.1, 0.2, 0.3],
        };

        let report = stepper
            .splat(&mut backend, &mut registry, &mut fields, &config, &splat)
            .unwrap();
        assert_eq!(report.passes_run, 2);

        let velocity = backend.read_target(fields.velocity.read().id()).unwrap();
        let dye = backend.read_target(fields.dye.read().id()).unwrap();
        assert!(velocity.iter().any(|t| t[0] > 0.0));
        assert!(dye.iter().any(|t| t[2] > 0.0));
        assert!(velocity.iter().all(|t| t[1] == 0.0));
    }

    #[test]
    fn test_radius_widened_for_landscape() {
        assert_eq!(correct_radius(0.01, 2.0), 0.02);
        assert_eq!(correct_radius(0.01, 0.5), 0.01);
    }
}
