//! Graphics context acquisition
//!
//! Opens a modern context first and falls back to GL/WebGL2. Each attempt
//! walks a list of adapter and device-limit strategies before giving up, and
//! the capability profile is negotiated from the adapter that succeeded.

use crate::error::{FluidError, FluidResult};
use crate::gpu::capability::{CapabilityProfile, Channels, ContextKind, FormatSupport, StorageFormat};
use crate::targets::TargetFormat;

/// Texture format backing a field of the given storage and channel layout.
pub fn texture_format(format: TargetFormat) -> wgpu::TextureFormat {
    use wgpu::TextureFormat as F;
    match (format.storage, format.channels) {
        (StorageFormat::HalfFloat, Channels::R) => F::R16Float,
        (StorageFormat::HalfFloat, Channels::Rg) => F::Rg16Float,
        (StorageFormat::HalfFloat, Channels::Rgba) => F::Rgba16Float,
        (StorageFormat::Float, Channels::R) => F::R32Float,
        (StorageFormat::Float, Channels::Rg) => F::Rg32Float,
        (StorageFormat::Float, Channels::Rgba) => F::Rgba32Float,
        (StorageFormat::Unorm8, Channels::R) => F::R8Unorm,
        (StorageFormat::Unorm8, Channels::Rg) => F::Rg8Unorm,
        (StorageFormat::Unorm8, Channels::Rgba) => F::Rgba8Unorm,
    }
}

/// Everything opened on the device side for one surface.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub profile: CapabilityProfile,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter.get_info().name)
            .field("format", &self.config.format)
            .field("size", &(self.config.width, self.config.height))
            .field("profile", &self.profile)
            .finish()
    }
}

impl GpuContext {
    /// Open a context for the surface produced by `make_target`.
    ///
    /// `make_target` is called once per attempt because a surface target is
    /// consumed by the instance that wraps it.
    pub async fn new<F>(make_target: F, width: u32, height: u32, transparent: bool) -> FluidResult<Self>
    where
        F: Fn() -> wgpu::SurfaceTarget<'static>,
    {
        let attempts = [
            (ContextKind::Modern, wgpu::Backends::PRIMARY),
            (ContextKind::Legacy, wgpu::Backends::GL),
        ];

        let mut last_reason = String::from("no backend attempted");
        for (kind, backends) in attempts {
            log::info!("[GpuContext::new] Trying {:?} context ({:?})", kind, backends);
            match Self::open(kind, backends, &make_target, width, height, transparent).await {
                Ok(context) => return Ok(context),
                Err(e) => {
                    log::warn!("[GpuContext::new] {:?} context unavailable: {}", kind, e);
                    last_reason = e.to_string();
                }
            }
        }

        log::error!("[GpuContext::new] No graphics context could be opened");
        Err(FluidError::NoGraphicsContext {
            reason: last_reason,
        })
    }

    async fn open<F>(
        kind: ContextKind,
        backends: wgpu::Backends,
        make_target: &F,
        width: u32,
        height: u32,
        transparent: bool,
    ) -> FluidResult<Self>
    where
        F: Fn() -> wgpu::SurfaceTarget<'static>,
    {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface = instance
            .create_surface(make_target())
            .map_err(|e| FluidError::NoGraphicsContext {
                reason: format!("surface creation failed: {}", e),
            })?;

        let adapter = Self::request_adapter(&instance, &surface)
            .await
            .ok_or_else(|| FluidError::NoGraphicsContext {
                reason: format!("no adapter for {:?}", backends),
            })?;
        let info = adapter.get_info();
        log::info!(
            "[GpuContext::open] Adapter: {} ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );

        let (device, queue) = Self::request_device(&adapter, kind).await?;
        device.on_uncaptured_error(Box::new(|error| {
            log::error!("[GPU] Uncaptured device error: {}", error);
        }));

        let profile = CapabilityProfile::negotiate(kind, |storage, channels| {
            let format = texture_format(TargetFormat { storage, channels });
            let features = adapter.get_texture_format_features(format);
            FormatSupport {
                renderable: features.allowed_usages.contains(
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                ),
                filterable: features
                    .flags
                    .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE),
            }
        })?
        .with_max_texture_dimension(device.limits().max_texture_dimension_2d);
        log::info!(
            "[GpuContext::open] Max texture dimension {}",
            profile.max_texture_dimension
        );

        let config = Self::surface_config(&surface, &adapter, width, height, transparent)?;
        surface.configure(&device, &config);
        log::info!(
            "[GpuContext::open] Surface {}x{} {:?}, alpha {:?}",
            config.width,
            config.height,
            config.format,
            config.alpha_mode
        );

        Ok(Self {
            instance,
            surface,
            adapter,
            device,
            queue,
            config,
            profile,
        })
    }

    async fn request_adapter(
        instance: &wgpu::Instance,
        surface: &wgpu::Surface<'static>,
    ) -> Option<wgpu::Adapter> {
        // A backdrop should not wake a discrete GPU when an integrated one works
        let power_preferences = [
            wgpu::PowerPreference::LowPower,
            wgpu::PowerPreference::HighPerformance,
        ];
        for power_preference in power_preferences {
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference,
                    compatible_surface: Some(surface),
                    force_fallback_adapter: false,
                })
                .await;
            if adapter.is_some() {
                return adapter;
            }
            log::debug!("[GpuContext::request_adapter] No {:?} adapter", power_preference);
        }

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::None,
                compatible_surface: Some(surface),
                force_fallback_adapter: true,
            })
            .await;
        if adapter.is_some() {
            log::warn!("[GpuContext::request_adapter] Using fallback adapter");
        }
        adapter
    }

    async fn request_device(
        adapter: &wgpu::Adapter,
        kind: ContextKind,
    ) -> FluidResult<(wgpu::Device, wgpu::Queue)> {
        let preferred = match kind {
            ContextKind::Modern => wgpu::Limits::downlevel_defaults(),
            ContextKind::Legacy => wgpu::Limits::downlevel_webgl2_defaults(),
        };
        let strategies = [
            ("adapter resolution", preferred.using_resolution(adapter.limits())),
            ("webgl2 defaults", wgpu::Limits::downlevel_webgl2_defaults()),
        ];

        let mut last_error = String::new();
        for (name, limits) in strategies {
            match adapter
                .request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("Fluid Backdrop Device"),
                        required_features: wgpu::Features::empty(),
                        required_limits: limits,
                    },
                    None,
                )
                .await
            {
                Ok(pair) => {
                    log::info!("[GpuContext::request_device] Device created with {} limits", name);
                    return Ok(pair);
                }
                Err(e) => {
                    log::warn!("[GpuContext::request_device] {} limits rejected: {}", name, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(FluidError::NoGraphicsContext {
            reason: format!("device request failed: {}", last_error),
        })
    }

    fn surface_config(
        surface: &wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        width: u32,
        height: u32,
        transparent: bool,
    ) -> FluidResult<wgpu::SurfaceConfiguration> {
        let mut config = surface
            .get_default_config(adapter, width.max(1), height.max(1))
            .ok_or_else(|| FluidError::NoGraphicsContext {
                reason: "surface is not supported by the adapter".to_string(),
            })?;
        let caps = surface.get_capabilities(adapter);

        // Dye values are already display-referred
        if let Some(format) = caps.formats.iter().copied().find(|f| !f.is_srgb()) {
            config.format = format;
        }
        if transparent && caps.alpha_modes.contains(&wgpu::CompositeAlphaMode::PreMultiplied) {
            config.alpha_mode = wgpu::CompositeAlphaMode::PreMultiplied;
        }
        config.present_mode = wgpu::PresentMode::Fifo;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_formats_match_storage() {
        let format = |storage, channels| texture_format(TargetFormat { storage, channels });
        assert_eq!(
            format(StorageFormat::HalfFloat, Channels::Rg),
            wgpu::TextureFormat::Rg16Float
        );
        assert_eq!(
            format(StorageFormat::Float, Channels::R),
            wgpu::TextureFormat::R32Float
        );
        assert_eq!(
            format(StorageFormat::Unorm8, Channels::Rgba),
            wgpu::TextureFormat::Rgba8Unorm
        );
    }
}
