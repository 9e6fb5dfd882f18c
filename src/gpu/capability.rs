//! Capability profile derived from what the graphics context can render to and sample.
//!
//! Negotiation is pure: the device layer hands in a probe closure describing
//! each `(storage, channels)` combination and gets back a profile that the
//! render-target pool, shader registry and config consult.

use crate::constants::grid::DEFAULT_MAX_TEXTURE_DIMENSION;
use crate::error::{FluidError, FluidResult};
use crate::targets::{FilterMode, TargetFormat};

/// Kind of graphics context that was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// WebGPU, Vulkan, Metal or DX12.
    Modern,
    /// OpenGL / WebGL2.
    Legacy,
}

/// Element storage used for simulation fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageFormat {
    HalfFloat,
    Float,
    /// Degraded tier: fields lose sign and precision.
    Unorm8,
}

impl StorageFormat {
    pub fn name(self) -> &'static str {
        match self {
            StorageFormat::HalfFloat => "half-float",
            StorageFormat::Float => "float",
            StorageFormat::Unorm8 => "unorm8",
        }
    }
}

/// Channel layout of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channels {
    R,
    Rg,
    Rgba,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Channels::R => 1,
            Channels::Rg => 2,
            Channels::Rgba => 4,
        }
    }

    /// Wider layouts tried when this one is not renderable.
    fn fallback_chain(self) -> &'static [Channels] {
        match self {
            Channels::R => &[Channels::R, Channels::Rg, Channels::Rgba],
            Channels::Rg => &[Channels::Rg, Channels::Rgba],
            Channels::Rgba => &[Channels::Rgba],
        }
    }
}

/// Result of probing one format on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatSupport {
    pub renderable: bool,
    pub filterable: bool,
}

impl FormatSupport {
    pub const FULL: Self = Self {
        renderable: true,
        filterable: true,
    };
    pub const RENDER_ONLY: Self = Self {
        renderable: true,
        filterable: false,
    };
    pub const NONE: Self = Self {
        renderable: false,
        filterable: false,
    };
}

/// Channel layout actually used for each requested layout after fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFormats {
    pub r: Channels,
    pub rg: Channels,
    pub rgba: Channels,
}

impl ChannelFormats {
    pub const NATIVE: Self = Self {
        r: Channels::R,
        rg: Channels::Rg,
        rgba: Channels::Rgba,
    };

    pub fn resolve(&self, requested: Channels) -> Channels {
        match requested {
            Channels::R => self.r,
            Channels::Rg => self.rg,
            Channels::Rgba => self.rgba,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityProfile {
    pub context: ContextKind,
    pub storage: StorageFormat,
    pub formats: ChannelFormats,
    pub supports_linear_filter: bool,
    /// Largest width or height a render target may have.
    pub max_texture_dimension: u32,
}

impl CapabilityProfile {
    /// Profile of a fully capable half-float device.
    pub fn half_float() -> Self {
        Self {
            context: ContextKind::Modern,
            storage: StorageFormat::HalfFloat,
            formats: ChannelFormats::NATIVE,
            supports_linear_filter: true,
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
        }
    }

    /// Same profile with linear filtering of float formats unavailable.
    pub fn without_linear_filter(mut self) -> Self {
        self.supports_linear_filter = false;
        self
    }

    /// Same profile on a device whose textures are at most `limit` texels wide.
    pub fn with_max_texture_dimension(mut self, limit: u32) -> Self {
        self.max_texture_dimension = limit.max(1);
        self
    }

    /// Derive a profile from per-format probe results.
    ///
    /// Half-float storage is preferred over full float. When neither can back
    /// an RGBA render target the profile degrades to 8-bit storage and the
    /// condition is logged as an unsupported format rather than failing.
    pub fn negotiate<F>(context: ContextKind, probe: F) -> FluidResult<Self>
    where
        F: Fn(StorageFormat, Channels) -> FormatSupport,
    {
        for storage in [StorageFormat::HalfFloat, StorageFormat::Float] {
            if let Some(profile) = Self::try_storage(context, storage, &probe) {
                log::info!(
                    "[CapabilityProfile::negotiate] {:?} context, {} storage, linear filter: {}",
                    context,
                    storage.name(),
                    profile.supports_linear_filter
                );
                return Ok(profile);
            }
            log::debug!(
                "[CapabilityProfile::negotiate] {} render targets unavailable",
                storage.name()
            );
        }

        let degraded = FluidError::UnsupportedFormat {
            format: "half-float and float render targets".to_string(),
        };
        log::warn!("[CapabilityProfile::negotiate] {} - degrading to unorm8", degraded);

        Self::try_storage(context, StorageFormat::Unorm8, &probe).ok_or_else(|| {
            FluidError::NoGraphicsContext {
                reason: "no renderable RGBA format".to_string(),
            }
        })
    }

    fn try_storage<F>(context: ContextKind, storage: StorageFormat, probe: &F) -> Option<Self>
    where
        F: Fn(StorageFormat, Channels) -> FormatSupport,
    {
        let resolve = |requested: Channels| {
            requested
                .fallback_chain()
                .iter()
                .copied()
                .find(|channels| probe(storage, *channels).renderable)
        };

        let formats = ChannelFormats {
            r: resolve(Channels::R)?,
            rg: resolve(Channels::Rg)?,
            rgba: resolve(Channels::Rgba)?,
        };

        Some(Self {
            context,
            storage,
            formats,
            supports_linear_filter: probe(storage, formats.rgba).filterable,
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
        })
    }

    /// Concrete format for a field that needs `channels` channels.
    pub fn target_format(&self, channels: Channels) -> TargetFormat {
        TargetFormat {
            storage: self.storage,
            channels: self.formats.resolve(channels),
        }
    }

    /// Sampling mode for fields that are read at fractional coordinates.
    pub fn field_filter(&self) -> FilterMode {
        if self.supports_linear_filter {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_float_preferred() {
        let profile =
            CapabilityProfile::negotiate(ContextKind::Modern, |_, _| FormatSupport::FULL).unwrap();
        assert_eq!(profile.storage, StorageFormat::HalfFloat);
        assert_eq!(profile.formats, ChannelFormats::NATIVE);
        assert!(profile.supports_linear_filter);
    }

    #[test]
    fn test_narrow_formats_fall_back_to_wider() {
        // Mirrors WebGL devices where only RGBA half-float is renderable.
        let profile = CapabilityProfile::negotiate(ContextKind::Legacy, |storage, channels| {
            match (storage, channels) {
                (StorageFormat::HalfFloat, Channels::Rgba) => FormatSupport::RENDER_ONLY,
                _ => FormatSupport::NONE,
            }
        })
        .unwrap();

        assert_eq!(profile.storage, StorageFormat::HalfFloat);
        assert_eq!(profile.formats.r, Channels::Rgba);
        assert_eq!(profile.formats.rg, Channels::Rgba);
        assert!(!profile.supports_linear_filter);
        assert_eq!(profile.field_filter(), FilterMode::Nearest);
    }

    #[test]
    fn test_float_used_when_half_float_missing() {
        let profile = CapabilityProfile::negotiate(ContextKind::Modern, |storage, _| {
            if storage == StorageFormat::Float {
                FormatSupport::RENDER_ONLY
            } else {
                FormatSupport::NONE
            }
        })
        .unwrap();
        assert_eq!(profile.storage, StorageFormat::Float);
    }

    #[test]
    fn test_degrades_to_unorm8() {
        let profile = CapabilityProfile::negotiate(ContextKind::Legacy, |storage, _| {
            if storage == StorageFormat::Unorm8 {
                FormatSupport::FULL
            } else {
                FormatSupport::NONE
            }
        })
        .unwrap();
        assert_eq!(profile.storage, StorageFormat::Unorm8);
    }

    #[test]
    fn test_nothing_renderable_is_fatal() {
        let result = CapabilityProfile::negotiate(ContextKind::Legacy, |_, _| FormatSupport::NONE);
        assert!(matches!(result, Err(FluidError::NoGraphicsContext { .. })));
    }
}
