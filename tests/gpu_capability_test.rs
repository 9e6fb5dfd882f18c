//! Probe a real adapter and negotiate a capability profile from it.
//!
//! Needs a GPU or software adapter, so it only runs on request:
//! `cargo test --test gpu_capability_test -- --ignored`

use fluid_backdrop::gpu::{texture_format, CapabilityProfile, ContextKind, FormatSupport};
use fluid_backdrop::targets::TargetFormat;

#[test]
#[ignore]
fn test_adapter_negotiates_renderable_profile() {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to find adapter");

        let profile = CapabilityProfile::negotiate(ContextKind::Modern, |storage, channels| {
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
        })
        .expect("adapter has no renderable format");

        println!(
            "✓ {} storage, linear filter: {}",
            profile.storage.name(),
            profile.supports_linear_filter
        );
    });
}
