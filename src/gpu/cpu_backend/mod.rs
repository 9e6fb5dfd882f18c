//! Deterministic host implementation of [`RenderBackend`].
//!
//! Runs every program on `f32` grids in a fixed order, so identical inputs
//! give bit-identical fields. Used by tests, benchmarks and headless runs.
//! Capabilities are injected, which lets callers exercise degraded devices.

mod grid;
mod kernels;

use glam::Vec2;
use rustc_hash::{FxHashMap, FxHashSet};

use self::grid::Grid;
use self::kernels::{Fragment, Inputs};
use crate::error::{shader_compile_error, shader_link_error, FluidError, FluidResult};
use crate::gpu::backend::{DrawCall, DrawTarget, ProgramId, RenderBackend};
use crate::gpu::capability::{CapabilityProfile, StorageFormat};
use crate::present::MaskImage;
use crate::shaders::{BlendMode, ProgramKind, ShaderKeywords};
use crate::targets::{FilterMode, TargetDesc, TargetId, TextureSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuProgram {
    kind: ProgramKind,
    keywords: ShaderKeywords,
}

pub struct CpuBackend {
    profile: CapabilityProfile,
    surface: Grid,
    surface_drawn: bool,
    clear_color: [f32; 4],
    targets: FxHashMap<TargetId, (Grid, StorageFormat)>,
    next_target: u32,
    programs: FxHashMap<ProgramId, CpuProgram>,
    next_program: u32,
    failing: FxHashSet<ProgramKind>,
    allocation_limit: Option<u32>,
    compile_attempts: usize,
    mask: Option<Grid>,
    draw_count: u64,
    frames_presented: u64,
}

impl CpuBackend {
    pub fn new(width: u32, height: u32, profile: CapabilityProfile) -> Self {
        Self {
            profile,
            surface: Grid::new(width.max(1), height.max(1), 4, FilterMode::Nearest),
            surface_drawn: false,
            clear_color: [0.0; 4],
            targets: FxHashMap::default(),
            next_target: 0,
            programs: FxHashMap::default(),
            next_program: 0,
            failing: FxHashSet::default(),
            allocation_limit: None,
            compile_attempts: 0,
            mask: None,
            draw_count: 0,
            frames_presented: 0,
        }
    }

    /// Make every later compile of `kind` fail.
    pub fn fail_program(&mut self, kind: ProgramKind) {
        self.failing.insert(kind);
    }

    /// Reject targets wider or taller than `limit`, whatever the profile says.
    pub fn reject_targets_above(&mut self, limit: u32) {
        self.allocation_limit = Some(limit);
    }

    fn texture_limit(&self) -> u32 {
        let limit = self.profile.max_texture_dimension;
        self.allocation_limit.map_or(limit, |extra| extra.min(limit))
    }

    pub fn compile_attempts(&self) -> usize {
        self.compile_attempts
    }

    /// Compiled variants, sorted by kind.
    pub fn compiled_programs(&self) -> Vec<(ProgramKind, ShaderKeywords)> {
        let mut programs: Vec<_> = self
            .programs
            .values()
            .map(|program| (program.kind, program.keywords))
            .collect();
        programs.sort_by_key(|(kind, _)| *kind);
        programs
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn draw_count(&self) -> u64 {
        self.draw_count
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Size of the uploaded mask texture, if any.
    pub fn mask_size(&self) -> Option<(u32, u32)> {
        self.mask.as_ref().map(|grid| (grid.width, grid.height))
    }

    /// Surface contents after the last presented frame.
    pub fn surface_pixels(&self) -> &[[f32; 4]] {
        &self.surface.texels
    }

    /// Overwrite a target's texels, row-major from the top row.
    pub fn write_target(&mut self, id: TargetId, texels: &[[f32; 4]]) -> FluidResult<()> {
        let (grid, _) = self
            .targets
            .get_mut(&id)
            .ok_or(FluidError::UnknownTarget(id))?;
        if texels.len() != grid.texels.len() {
            return Err(FluidError::Readback(format!(
                "expected {} texels for {:?}, got {}",
                grid.texels.len(),
                id,
                texels.len()
            )));
        }
        grid.texels.copy_from_slice(texels);
        Ok(())
    }

    fn input_grid(&self, source: TextureSource) -> FluidResult<&Grid> {
        match source {
            TextureSource::Target(id) => self
                .targets
                .get(&id)
                .map(|(grid, _)| grid)
                .ok_or(FluidError::UnknownTarget(id)),
            TextureSource::Mask => self
                .mask
                .as_ref()
                .ok_or_else(|| FluidError::Mask("no mask uploaded".to_string())),
        }
    }

    fn shade_output(
        &self,
        program: CpuProgram,
        call: &DrawCall,
        width: u32,
        height: u32,
    ) -> FluidResult<Vec<glam::Vec4>> {
        let mut slots = [None; crate::constants::gpu::TEXTURE_SLOTS];
        for (slot, source) in slots.iter_mut().zip(call.inputs.iter()) {
            if let Some(source) = source {
                *slot = Some(self.input_grid(*source)?);
            }
        }
        let inputs = Inputs { slots };
        let texel = call.params.texel_size();

        let mut out = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let uv = Vec2::new(
                    (x as f32 + 0.5) / width as f32,
                    (y as f32 + 0.5) / height as f32,
                );
                let frag = Fragment::new(uv, texel);
                out.push(kernels::shade(
                    program.kind,
                    program.keywords,
                    &call.params,
                    &inputs,
                    &frag,
                ));
            }
        }
        Ok(out)
    }
}

impl RenderBackend for CpuBackend {
    fn capabilities(&self) -> &CapabilityProfile {
        &self.profile
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> FluidResult<()> {
        self.surface = Grid::new(width.max(1), height.max(1), 4, FilterMode::Nearest);
        Ok(())
    }

    fn create_target(&mut self, desc: &TargetDesc) -> FluidResult<TargetId> {
        let limit = self.texture_limit();
        if desc.width > limit || desc.height > limit {
            return Err(FluidError::UnsupportedFormat {
                format: format!("{}x{} exceeds the {} texel limit", desc.width, desc.height, limit),
            });
        }

        let id = TargetId(self.next_target);
        self.next_target += 1;
        let grid = Grid::new(
            desc.width,
            desc.height,
            desc.format.channels.count(),
            desc.filter,
        );
        self.targets.insert(id, (grid, desc.format.storage));
        Ok(id)
    }

    fn release_target(&mut self, id: TargetId) {
        self.targets.remove(&id);
    }

    fn compile_program(
        &mut self,
        kind: ProgramKind,
        keywords: ShaderKeywords,
        wgsl: &str,
    ) -> FluidResult<ProgramId> {
        self.compile_attempts += 1;
        if self.failing.contains(&kind) {
            return Err(shader_compile_error(kind.name(), "forced failure"));
        }
        if !wgsl.contains("fn vs_main") || !wgsl.contains("fn fs_main") {
            return Err(shader_link_error(kind.name(), "missing entry point"));
        }

        let id = ProgramId(self.next_program);
        self.next_program += 1;
        self.programs.insert(id, CpuProgram { kind, keywords });
        Ok(id)
    }

    fn release_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn upload_mask(&mut self, mask: &MaskImage) -> FluidResult<()> {
        let mask = mask.fit_within(self.texture_limit())?;
        let mut grid = Grid::new(mask.width(), mask.height(), 4, FilterMode::Linear);
        for (texel, pixel) in grid.texels.iter_mut().zip(mask.pixels().chunks_exact(4)) {
            for (channel, byte) in texel.iter_mut().zip(pixel) {
                *channel = *byte as f32 / 255.0;
            }
        }
        self.mask = Some(grid);
        Ok(())
    }

    fn clear_mask(&mut self) {
        self.mask = None;
    }

    fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    fn draw(&mut self, call: &DrawCall) -> FluidResult<()> {
        call.check_aliasing()?;
        let program = *self
            .programs
            .get(&call.program)
            .ok_or_else(|| shader_link_error("unknown", format!("{:?}", call.program)))?;

        match call.output {
            DrawTarget::Field(id) => {
                let (width, height) = self
                    .targets
                    .get(&id)
                    .map(|(grid, _)| (grid.width, grid.height))
                    .ok_or(FluidError::UnknownTarget(id))?;
                let shaded = self.shade_output(program, call, width, height)?;

                let (grid, storage) = self
                    .targets
                    .get_mut(&id)
                    .ok_or(FluidError::UnknownTarget(id))?;
                let channels = grid.channels;
                for (texel, value) in grid.texels.iter_mut().zip(shaded) {
                    *texel = grid::store(channels, value, *storage);
                }
            }
            DrawTarget::Surface => {
                let (width, height) = (self.surface.width, self.surface.height);
                let shaded = self.shade_output(program, call, width, height)?;

                if !self.surface_drawn {
                    self.surface.texels.fill(self.clear_color);
                    self.surface_drawn = true;
                }
                for (texel, src) in self.surface.texels.iter_mut().zip(shaded) {
                    let src = src.to_array();
                    *texel = match program.kind.blend() {
                        BlendMode::Replace => src,
                        BlendMode::Premultiplied => {
                            let keep = 1.0 - src[3];
                            [
                                src[0] + texel[0] * keep,
                                src[1] + texel[1] * keep,
                                src[2] + texel[2] * keep,
                                src[3] + texel[3] * keep,
                            ]
                        }
                    };
                }
            }
        }

        self.draw_count += 1;
        Ok(())
    }

    fn end_frame(&mut self) -> FluidResult<()> {
        if self.surface_drawn {
            self.frames_presented += 1;
            self.surface_drawn = false;
        }
        Ok(())
    }

    fn read_target(&mut self, id: TargetId) -> FluidResult<Vec<[f32; 4]>> {
        self.targets
            .get(&id)
            .map(|(grid, _)| grid.texels.clone())
            .ok_or(FluidError::UnknownTarget(id))
    }
}
