use rustc_hash::FxHashMap;

use super::keywords::ShaderKeywords;
use super::preprocessor::preprocess_program;
use super::program::ProgramKind;
use crate::error::shader_compile_error;
use crate::gpu::backend::{ProgramId, RenderBackend};

/// Result of looking up a program variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramHandle {
    Ready(ProgramId),
    /// The variant failed to build. Callers skip the pass.
    NoOp,
}

impl ProgramHandle {
    pub fn id(self) -> Option<ProgramId> {
        match self {
            ProgramHandle::Ready(id) => Some(id),
            ProgramHandle::NoOp => None,
        }
    }

    pub fn is_noop(self) -> bool {
        matches!(self, ProgramHandle::NoOp)
    }
}

/// Compiles program variants on first use and keeps them for the session.
///
/// Failed variants are cached as [`ProgramHandle::NoOp`] so a broken shader
/// logs once instead of every frame.
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    cache: FxHashMap<(ProgramKind, ShaderKeywords), ProgramHandle>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        kind: ProgramKind,
        keywords: ShaderKeywords,
    ) -> ProgramHandle {
        let keywords = keywords.intersection(kind.supported_keywords());
        if let Some(handle) = self.cache.get(&(kind, keywords)) {
            return *handle;
        }

        let handle = match Self::build(backend, kind, keywords) {
            Ok(id) => {
                log::debug!(
                    "[ShaderRegistry::program] Compiled '{}' {:?}",
                    kind.name(),
                    keywords
                );
                ProgramHandle::Ready(id)
            }
            Err(e) => {
                log::error!(
                    "[ShaderRegistry::program] {} - pass '{}' disabled",
                    e,
                    kind.name()
                );
                ProgramHandle::NoOp
            }
        };

        self.cache.insert((kind, keywords), handle);
        handle
    }

    fn build<B: RenderBackend + ?Sized>(
        backend: &mut B,
        kind: ProgramKind,
        keywords: ShaderKeywords,
    ) -> crate::FluidResult<ProgramId> {
        let wgsl = preprocess_program(kind.source(), keywords)
            .map_err(|e| shader_compile_error(kind.name(), e))?;
        backend.compile_program(kind, keywords, &wgsl)
    }

    pub fn is_cached(&self, kind: ProgramKind, keywords: ShaderKeywords) -> bool {
        self.cache
            .contains_key(&(kind, keywords.intersection(kind.supported_keywords())))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Release every compiled program.
    pub fn release_all<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, handle) in self.cache.drain() {
            if let ProgramHandle::Ready(id) = handle {
                backend.release_program(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::capability::CapabilityProfile;
    use crate::gpu::cpu_backend::CpuBackend;

    #[test]
    fn test_variants_cached_by_keywords() {
        let mut backend = CpuBackend::new(8, 8, CapabilityProfile::half_float());
        let mut registry = ShaderRegistry::new();

        let plain = registry.program(&mut backend, ProgramKind::Advection, ShaderKeywords::empty());
        let again = registry.program(&mut backend, ProgramKind::Advection, ShaderKeywords::empty());
        let manual = registry.program(
            &mut backend,
            ProgramKind::Advection,
            ShaderKeywords::MANUAL_FILTERING,
        );

        assert_eq!(plain, again);
        assert_ne!(plain, manual);
        assert_eq!(registry.len(), 2);
        assert_eq!(backend.compiled_programs().len(), 2);
    }

    #[test]
    fn test_irrelevant_keywords_share_a_variant() {
        let mut backend = CpuBackend::new(8, 8, CapabilityProfile::half_float());
        let mut registry = ShaderRegistry::new();

        let a = registry.program(&mut backend, ProgramKind::Curl, ShaderKeywords::empty());
        let b = registry.program(&mut backend, ProgramKind::Curl, ShaderKeywords::all());
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_compile_yields_cached_noop() {
        let mut backend = CpuBackend::new(8, 8, CapabilityProfile::half_float());
        backend.fail_program(ProgramKind::Vorticity);
        let mut registry = ShaderRegistry::new();

        let handle = registry.program(&mut backend, ProgramKind::Vorticity, ShaderKeywords::empty());
        assert!(handle.is_noop());
        assert!(registry.is_cached(ProgramKind::Vorticity, ShaderKeywords::empty()));
        assert_eq!(backend.compile_attempts(), 1);

        registry.program(&mut backend, ProgramKind::Vorticity, ShaderKeywords::empty());
        assert_eq!(backend.compile_attempts(), 1);
    }

    #[test]
    fn test_release_all_empties_backend() {
        let mut backend = CpuBackend::new(8, 8, CapabilityProfile::half_float());
        let mut registry = ShaderRegistry::new();
        for kind in ProgramKind::ALL {
            registry.program(&mut backend, kind, ShaderKeywords::empty());
        }
        assert_eq!(backend.compiled_programs().len(), ProgramKind::ALL.len());

        registry.release_all(&mut backend);
        assert!(registry.is_empty());
        assert!(backend.compiled_programs().is_empty());
    }
}
