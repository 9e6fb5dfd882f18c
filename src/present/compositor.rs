use glam::Vec2;

use crate::config::SimulationConfig;
use crate::error::FluidResult;
use crate::gpu::backend::{DrawCall, DrawTarget, PassParams, RenderBackend};
use crate::shaders::{ProgramHandle, ProgramKind, ShaderKeywords, ShaderRegistry};
use crate::targets::{FieldSet, TextureSource};

/// What the presenter drew this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Dye,
    Mask,
    /// The display program is unavailable.
    Nothing,
}

/// Draws the dye field, or the flow-distorted mask, onto the surface.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    mask_aspect: Option<f32>,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the aspect of a newly uploaded mask, or `None` when cleared.
    pub fn set_mask_aspect(&mut self, aspect: Option<f32>) {
        self.mask_aspect = aspect;
    }

    pub fn has_mask(&self) -> bool {
        self.mask_aspect.is_some()
    }

    pub fn present<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ShaderRegistry,
        fields: &FieldSet,
        config: &SimulationConfig,
    ) -> FluidResult<Presented> {
        let (kind, keywords, inputs, presented) = match self.mask_aspect {
            Some(_) if backend.has_mask() => (
                ProgramKind::DisplayMask,
                ShaderKeywords::empty(),
                [
                    Some(fields.dye.read().attach()),
                    Some(fields.velocity.read().attach()),
                    Some(TextureSource::Mask),
                ],
                Presented::Mask,
            ),
            _ => {
                let mut keywords = ShaderKeywords::empty();
                keywords.set(ShaderKeywords::SHADING, config.shading);
                (
                    ProgramKind::Display,
                    keywords,
                    [Some(fields.dye.read().attach()), None, None],
                    Presented::Dye,
                )
            }
        };

        let program = match registry.program(backend, kind, keywords) {
            ProgramHandle::Ready(program) => program,
            ProgramHandle::NoOp => return Ok(Presented::Nothing),
        };

        let params = self.pass_params(backend.surface_size(), config);
        backend.draw(&DrawCall {
            program,
            inputs,
            params,
            output: DrawTarget::Surface,
        })?;
        Ok(presented)
    }

    /// Shading neighbours sit one surface pixel apart, whatever the dye resolution.
    fn pass_params(&self, surface: (u32, u32), config: &SimulationConfig) -> PassParams {
        let width = surface.0.max(1) as f32;
        let height = surface.1.max(1) as f32;
        let aspect_ratio = width / height;
        PassParams {
            aspect_ratio,
            distortion: config.distortion_power,
            mask_aspect: self.mask_aspect.unwrap_or(aspect_ratio),
            ..PassParams::with_texel(Vec2::new(1.0 / width, 1.0 / height))
        }
    }
}
