use rustc_hash::FxHashSet;

use super::double::DoubleBufferedTarget;
use super::target::{RenderTarget, TargetDesc, TargetId};
use crate::config::{fit_grid, grid_resolution, SimulationConfig};
use crate::error::FluidResult;
use crate::gpu::backend::{DrawCall, DrawTarget, PassParams, RenderBackend};
use crate::gpu::capability::{CapabilityProfile, Channels};
use crate::shaders::{ProgramHandle, ProgramKind, ShaderKeywords, ShaderRegistry};
use crate::targets::FilterMode;

/// The simulation fields of one engine instance.
#[derive(Debug)]
pub struct FieldSet {
    pub velocity: DoubleBufferedTarget,
    pub dye: DoubleBufferedTarget,
    pub divergence: RenderTarget,
    pub curl: RenderTarget,
    pub pressure: DoubleBufferedTarget,
}

impl FieldSet {
    pub fn sim_size(&self) -> (u32, u32) {
        self.velocity.size()
    }

    pub fn dye_size(&self) -> (u32, u32) {
        self.dye.size()
    }
}

/// Field descriptors for a surface size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub velocity: TargetDesc,
    pub dye: TargetDesc,
    pub scalar: TargetDesc,
}

impl FieldLayout {
    pub fn derive(
        config: &SimulationConfig,
        profile: &CapabilityProfile,
        surface_width: u32,
        surface_height: u32,
    ) -> Self {
        let limit = profile.max_texture_dimension;
        let (sim_w, sim_h) = fit_grid(
            grid_resolution(config.sim_resolution, surface_width, surface_height),
            limit,
        );
        let (dye_w, dye_h) = fit_grid(
            grid_resolution(config.dye_resolution, surface_width, surface_height),
            limit,
        );
        let filter = profile.field_filter();

        Self {
            velocity: TargetDesc {
                width: sim_w,
                height: sim_h,
                format: profile.target_format(Channels::Rg),
                filter,
            },
            dye: TargetDesc {
                width: dye_w,
                height: dye_h,
                format: profile.target_format(Channels::Rgba),
                filter,
            },
            scalar: TargetDesc {
                width: sim_w,
                height: sim_h,
                format: profile.target_format(Channels::R),
                filter: FilterMode::Nearest,
            },
        }
    }
}

/// Allocates, resizes and releases render targets.
///
/// Every target the engine uses goes through here, so the pool's ledger of
/// live ids is the single record of what the backend still holds.
#[derive(Debug, Default)]
pub struct RenderTargetPool {
    live: FxHashSet<TargetId>,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_targets(&self) -> usize {
        self.live.len()
    }

    pub fn create_target<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        desc: TargetDesc,
    ) -> FluidResult<RenderTarget> {
        let desc = desc.with_size(desc.width, desc.height);
        let id = backend.create_target(&desc)?;
        self.live.insert(id);
        Ok(RenderTarget::new(id, desc))
    }

    pub fn create_double<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        desc: TargetDesc,
    ) -> FluidResult<DoubleBufferedTarget> {
        let read = self.create_target(backend, desc)?;
        let write = self.create_target(backend, desc)?;
        DoubleBufferedTarget::new(read, write)
    }

    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, target: RenderTarget) {
        if self.live.remove(&target.id()) {
            backend.release_target(target.id());
        } else {
            log::warn!(
                "[RenderTargetPool::release] {:?} is not owned by this pool",
                target.id()
            );
        }
    }

    pub fn release_double<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        target: DoubleBufferedTarget,
    ) {
        let (read, write) = target.into_roles();
        self.release(backend, read);
        self.release(backend, write);
    }

    /// Reallocate `target` at a new size, carrying its contents over with a
    /// copy pass before the old texture is released.
    pub fn resize<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &mut ShaderRegistry,
        target: RenderTarget,
        width: u32,
        height: u32,
    ) -> FluidResult<RenderTarget> {
        if target.size() == (width.max(1), height.max(1)) {
            return Ok(target);
        }

        let resized = self.create_target(backend, target.desc().with_size(width, height))?;
        Self::copy_contents(backend, registry, &target, &resized);
        self.release(backend, target);
        Ok(resized)
    }

    /// Resample `from` into `to`. A failed copy leaves `to` cleared.
    fn copy_contents<B: RenderBackend + ?Sized>(
        backend: &mut B,
        registry: &mut ShaderRegistry,
        from: &RenderTarget,
        to: &RenderTarget,
    ) {
        match registry.program(backend, ProgramKind::Copy, ShaderKeywords::empty()) {
            ProgramHandle::Ready(program) => {
                let call = DrawCall {
                    program,
                    inputs: [Some(from.attach()), None, None],
                    params: PassParams::with_texel(to.texel_size()),
                    output: DrawTarget::Field(to.id()),
                };
                if let Err(e) = backend.draw(&call) {
                    log::warn!("[RenderTargetPool::copy_contents] Content copy failed: {}", e);
                }
            }
            ProgramHandle::NoOp => {
                log::warn!("[RenderTargetPool::copy_contents] Copy program unavailable, contents reset");
            }
        }
    }

    /// Allocate every field for `layout`. On failure nothing stays allocated.
    pub fn create_fields<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        layout: &FieldLayout,
    ) -> FluidResult<FieldSet> {
        log::info!(
            "[RenderTargetPool::create_fields] sim {}x{}, dye {}x{}",
            layout.velocity.width,
            layout.velocity.height,
            layout.dye.width,
            layout.dye.height
        );

        let before = self.live.clone();
        match self.allocate_fields(backend, layout) {
            Ok(fields) => Ok(fields),
            Err(e) => {
                let partial: Vec<TargetId> = self.live.difference(&before).copied().collect();
                for id in partial {
                    self.live.remove(&id);
                    backend.release_target(id);
                }
                log::warn!("[RenderTargetPool::create_fields] Allocation failed: {}", e);
                Err(e)
            }
        }
    }

    fn allocate_fields<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        layout: &FieldLayout,
    ) -> FluidResult<FieldSet> {
        Ok(FieldSet {
            velocity: self.create_double(backend, layout.velocity)?,
            dye: self.create_double(backend, layout.dye)?,
            divergence: self.create_target(backend, layout.scalar)?,
            curl: self.create_target(backend, layout.scalar)?,
            pressure: self.create_double(backend, layout.scalar)?,
        })
    }

    /// Reallocate fields for a new layout.
    ///
    /// The new set is allocated in full before anything is released, so on
    /// error `fields` is untouched and still usable. Velocity and dye are
    /// resampled into their new targets; divergence, curl and pressure are
    /// recomputed every tick and start cleared.
    pub fn resize_fields<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        registry: &mut ShaderRegistry,
        fields: &mut FieldSet,
        layout: &FieldLayout,
    ) -> FluidResult<()> {
        let sim = (layout.velocity.width, layout.velocity.height);
        let dye = (layout.dye.width, layout.dye.height);
        if fields.sim_size() == sim && fields.dye_size() == dye {
            return Ok(());
        }

        let fresh = self.create_fields(backend, layout)?;
        Self::copy_contents(backend, registry, fields.velocity.read(), fresh.velocity.read());
        Self::copy_contents(backend, registry, fields.dye.read(), fresh.dye.read());

        let old = std::mem::replace(fields, fresh);
        self.release_fields(backend, old);

        log::debug!(
            "[RenderTargetPool::resize_fields] sim {}x{}, dye {}x{}",
            sim.0,
            sim.1,
            dye.0,
            dye.1
        );
        Ok(())
    }

    pub fn release_fields<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, fields: FieldSet) {
        self.release_double(backend, fields.velocity);
        self.release_double(backend, fields.dye);
        self.release(backend, fields.divergence);
        self.release(backend, fields.curl);
        self.release_double(backend, fields.pressure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::cpu_backend::CpuBackend;

    fn setup() -> (CpuBackend, ShaderRegistry, RenderTargetPool, FieldLayout) {
        let backend = CpuBackend::new(200, 100, CapabilityProfile::half_float());
        let layout = FieldLayout::derive(
            &SimulationConfig::default(),
            backend.capabilities(),
            200,
            100,
        );
        (backend, ShaderRegistry::new(), RenderTargetPool::new(), layout)
    }

    #[test]
    fn test_layout_gives_longer_axis_more_cells() {
        let (_, _, _, layout) = setup();
        assert_eq!((layout.velocity.width, layout.velocity.height), (112, 56));
        assert_eq!((layout.dye.width, layout.dye.height), (768, 384));
        assert_eq!(layout.scalar.filter, FilterMode::Nearest);
        assert_eq!(layout.velocity.format.channels, Channels::Rg);
    }

    #[test]
    fn test_layout_respects_texture_limit() {
        let profile = CapabilityProfile::half_float().with_max_texture_dimension(2048);
        let layout = FieldLayout::derive(&SimulationConfig::default(), &profile, 2200, 400);
        assert_eq!((layout.dye.width, layout.dye.height), (2048, 372));
        assert_eq!((layout.velocity.width, layout.velocity.height), (308, 56));
    }

    #[test]
    fn test_resize_keeps_contents() {
        let (mut backend, mut registry, mut pool, layout) = setup();
        let desc = layout.scalar.with_size(2, 2);
        let target = pool.create_target(&mut backend, desc).unwrap();
        backend
            .write_target(target.id(), &[[1.0, 0.0, 0.0, 1.0]; 4])
            .unwrap();

        let resized = pool.resize(&mut backend, &mut registry, target, 4, 4).unwrap();
        let texels = backend.read_target(resized.id()).unwrap();
        assert_eq!(texels.len(), 16);
        assert!(texels.iter().all(|t| (t[0] - 1.0).abs() < 1e-6));
        assert_eq!(pool.live_targets(), 1);
        assert_eq!(backend.live_targets(), 1);
    }

    #[test]
    fn test_same_size_resize_is_noop() {
        let (mut backend, mut registry, mut pool, layout) = setup();
        let target = pool.create_target(&mut backend, layout.scalar).unwrap();
        let id = target.id();
        let (w, h) = target.size();
        let target = pool.resize(&mut backend, &mut registry, target, w, h).unwrap();
        assert_eq!(target.id(), id);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_fields_release_everything() {
        let (mut backend, mut registry, mut pool, layout) = setup();
        let mut fields = pool.create_fields(&mut backend, &layout).unwrap();
        assert_eq!(pool.live_targets(), 8);

        let smaller = FieldLayout::derive(
            &SimulationConfig::default(),
            &CapabilityProfile::half_float(),
            50,
            100,
        );
        pool.resize_fields(&mut backend, &mut registry, &mut fields, &smaller)
            .unwrap();
        assert_eq!(fields.sim_size(), (56, 112));
        assert_eq!(pool.live_targets(), 8);
        assert_eq!(backend.live_targets(), 8);

        pool.release_fields(&mut backend, fields);
        assert_eq!(pool.live_targets(), 0);
        assert_eq!(backend.live_targets(), 0);
    }
}
