//! Explicit command submission
//!
//! Every draw names its program, up to three texture inputs and one output.
//! Backends keep no bind state between draws, so a pass can never read a
//! texture left bound by an earlier one.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

use crate::constants::gpu::TEXTURE_SLOTS;
use crate::constants::grid::{CURL_GRADIENT_EPSILON, VELOCITY_LIMIT};
use crate::error::{FluidError, FluidResult};
use crate::gpu::capability::CapabilityProfile;
use crate::present::MaskImage;
use crate::shaders::{ProgramKind, ShaderKeywords};
use crate::targets::{TargetDesc, TargetId, TextureSource};

/// Backend handle to a compiled program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u32);

/// Uniform block shared by every program.
///
/// Layout matches `PassParams` in `common.wgsl` (80 bytes, 16-byte aligned).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PassParams {
    pub texel_size: [f32; 2],
    pub dye_texel_size: [f32; 2],
    pub color: [f32; 4],
    pub point: [f32; 2],
    pub dt: f32,
    pub dissipation: f32,
    pub aspect_ratio: f32,
    pub radius: f32,
    pub curl: f32,
    pub value: f32,
    pub distortion: f32,
    pub mask_aspect: f32,
    pub curl_epsilon: f32,
    pub velocity_limit: f32,
}

impl Default for PassParams {
    fn default() -> Self {
        Self {
            curl_epsilon: CURL_GRADIENT_EPSILON,
            velocity_limit: VELOCITY_LIMIT,
            ..Zeroable::zeroed()
        }
    }
}

impl PassParams {
    pub fn with_texel(texel_size: Vec2) -> Self {
        Self {
            texel_size: texel_size.to_array(),
            ..Self::default()
        }
    }

    pub fn texel_size(&self) -> Vec2 {
        Vec2::from_array(self.texel_size)
    }

    pub fn dye_texel_size(&self) -> Vec2 {
        Vec2::from_array(self.dye_texel_size)
    }

    pub fn point(&self) -> Vec2 {
        Vec2::from_array(self.point)
    }

    pub fn color(&self) -> Vec4 {
        Vec4::from_array(self.color)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTarget {
    Field(TargetId),
    Surface,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub inputs: [Option<TextureSource>; TEXTURE_SLOTS],
    pub params: PassParams,
    pub output: DrawTarget,
}

impl DrawCall {
    /// Reject draws that sample the texture they write.
    pub fn check_aliasing(&self) -> FluidResult<()> {
        if let DrawTarget::Field(output) = self.output {
            let aliased = self
                .inputs
                .iter()
                .flatten()
                .any(|input| *input == TextureSource::Target(output));
            if aliased {
                return Err(FluidError::TargetAliasing(output));
            }
        }
        Ok(())
    }
}

/// A device that can own fields, compile programs and execute draw calls.
pub trait RenderBackend {
    fn capabilities(&self) -> &CapabilityProfile;

    /// Current drawable surface size in pixels.
    fn surface_size(&self) -> (u32, u32);

    fn resize_surface(&mut self, width: u32, height: u32) -> FluidResult<()>;

    fn create_target(&mut self, desc: &TargetDesc) -> FluidResult<TargetId>;

    fn release_target(&mut self, id: TargetId);

    /// Compile and link one program variant from preprocessed WGSL.
    fn compile_program(
        &mut self,
        kind: ProgramKind,
        keywords: ShaderKeywords,
        wgsl: &str,
    ) -> FluidResult<ProgramId>;

    fn release_program(&mut self, id: ProgramId);

    fn upload_mask(&mut self, mask: &MaskImage) -> FluidResult<()>;

    fn clear_mask(&mut self);

    fn has_mask(&self) -> bool;

    fn draw(&mut self, call: &DrawCall) -> FluidResult<()>;

    /// Submit the recorded frame and present the surface if it was drawn.
    fn end_frame(&mut self) -> FluidResult<()>;

    /// Copy a target back to the host as RGBA texels, row-major from the top row.
    fn read_target(&mut self, id: TargetId) -> FluidResult<Vec<[f32; 4]>> {
        Err(FluidError::Readback(format!(
            "backend cannot read back target {:?}",
            id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_params_layout() {
        assert_eq!(std::mem::size_of::<PassParams>(), 80);
        assert_eq!(std::mem::size_of::<PassParams>() % 16, 0);
    }

    #[test]
    fn test_default_params_carry_solver_limits() {
        let params = PassParams::with_texel(Vec2::ONE);
        assert_eq!(params.curl_epsilon, CURL_GRADIENT_EPSILON);
        assert_eq!(params.velocity_limit, VELOCITY_LIMIT);
        assert_eq!(params.dt, 0.0);
    }

    #[test]
    fn test_aliasing_draw_rejected() {
        let call = DrawCall {
            program: ProgramId(0),
            inputs: [Some(TextureSource::Target(TargetId(3))), None, None],
            params: PassParams::default(),
            output: DrawTarget::Field(TargetId(3)),
        };
        assert!(matches!(
            call.check_aliasing(),
            Err(FluidError::TargetAliasing(TargetId(3)))
        ));

        let surface = DrawCall {
            output: DrawTarget::Surface,
            ..call
        };
        assert!(surface.check_aliasing().is_ok());
    }
}
