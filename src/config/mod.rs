//! Simulation configuration
//!
//! `SimulationConfig` is fixed for a session. It can come from defaults, a
//! device tier, or a partial TOML/JSON document, and is degraded once more by
//! the capability profile before any target is allocated.

pub mod tier;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{grid, surface, timing};
use crate::error::{FluidError, FluidErrorContext, FluidResult};
use crate::gpu::capability::CapabilityProfile;

pub use tier::{DeviceHints, DeviceTier};

/// How device pointer ids map onto tracked pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerMode {
    /// Every device drives the single ambient pointer.
    #[default]
    Pooled,
    /// One pointer per device id.
    MultiTouch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub sim_resolution: u32,
    pub dye_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// Decay applied to last frame's pressure before the solve.
    pub pressure: f32,
    pub pressure_iterations: u32,
    pub curl: f32,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub shading: bool,
    pub color_update_speed: f32,
    pub target_fps: f32,
    pub max_pixel_ratio: f32,
    pub distortion_power: f32,
    pub transparent: bool,
    pub pointer_mode: PointerMode,
    /// Fixes colour and tap-direction randomness when set.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_resolution: 56,
            dye_resolution: 384,
            density_dissipation: 3.8,
            velocity_dissipation: 2.2,
            pressure: 0.8,
            pressure_iterations: 5,
            curl: 1.6,
            splat_radius: 0.12,
            splat_force: 2200.0,
            shading: false,
            color_update_speed: 6.0,
            target_fps: timing::DEFAULT_TARGET_FPS,
            max_pixel_ratio: surface::DEFAULT_MAX_PIXEL_RATIO,
            distortion_power: 1.2,
            transparent: true,
            pointer_mode: PointerMode::Pooled,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Defaults scaled for a device tier.
    pub fn for_tier(tier: DeviceTier) -> Self {
        let base = Self::default();
        match tier {
            DeviceTier::Standard => base,
            DeviceTier::LowEnd => Self {
                sim_resolution: 40,
                dye_resolution: 256,
                pressure_iterations: 3,
                curl: 1.0,
                splat_force: 1600.0,
                ..base
            },
        }
    }

    pub fn from_toml_str(raw: &str) -> FluidResult<Self> {
        let config: Self = toml::from_str(raw).config_context("parse TOML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> FluidResult<Self> {
        let config: Self = serde_json::from_str(raw).config_context("parse JSON config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file (`.json` files are parsed as JSON).
    pub fn load<P: AsRef<Path>>(path: P) -> FluidResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&raw)?,
            _ => Self::from_toml_str(&raw)?,
        };
        log::info!("[SimulationConfig::load] Loaded {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> FluidResult<()> {
        let resolution_ok =
            |r: u32| (1..=grid::MAX_GRID_RESOLUTION).contains(&r);
        if !resolution_ok(self.sim_resolution) || !resolution_ok(self.dye_resolution) {
            return Err(FluidError::InvalidConfig(format!(
                "resolutions must be in 1..={}, got sim {} dye {}",
                grid::MAX_GRID_RESOLUTION,
                self.sim_resolution,
                self.dye_resolution
            )));
        }

        let non_negative = [
            ("density_dissipation", self.density_dissipation),
            ("velocity_dissipation", self.velocity_dissipation),
            ("pressure", self.pressure),
            ("curl", self.curl),
            ("splat_force", self.splat_force),
            ("color_update_speed", self.color_update_speed),
            ("target_fps", self.target_fps),
            ("distortion_power", self.distortion_power),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(FluidError::InvalidConfig(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }

        if !self.splat_radius.is_finite() || self.splat_radius <= 0.0 {
            return Err(FluidError::InvalidConfig(format!(
                "splat_radius must be positive, got {}",
                self.splat_radius
            )));
        }
        if !self.max_pixel_ratio.is_finite() || self.max_pixel_ratio <= 0.0 {
            return Err(FluidError::InvalidConfig(format!(
                "max_pixel_ratio must be positive, got {}",
                self.max_pixel_ratio
            )));
        }

        Ok(())
    }

    /// Jacobi iterations actually run per tick.
    pub fn effective_pressure_iterations(&self) -> u32 {
        self.pressure_iterations.min(grid::MAX_PRESSURE_ITERATIONS)
    }

    /// Degrade settings the device cannot honour.
    pub fn apply_capabilities(&mut self, profile: &CapabilityProfile) {
        if profile.supports_linear_filter {
            return;
        }

        let clamped = self
            .dye_resolution
            .clamp(grid::SAFE_DYE_RESOLUTION_MIN, grid::SAFE_DYE_RESOLUTION_MAX);
        log::info!(
            "[SimulationConfig::apply_capabilities] No float linear filtering: dye {} -> {}, shading off",
            self.dye_resolution,
            clamped
        );
        self.dye_resolution = clamped;
        self.shading = false;
    }

    /// Device pixel ratio after the `max_pixel_ratio` cap.
    pub fn pixel_ratio(&self, device_pixel_ratio: f32) -> f32 {
        if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio.min(self.max_pixel_ratio)
        } else {
            1.0
        }
    }

    /// Physical surface size for a logical size and device pixel ratio.
    pub fn surface_pixels(&self, logical_width: f32, logical_height: f32, device_pixel_ratio: f32) -> (u32, u32) {
        let ratio = self.pixel_ratio(device_pixel_ratio);
        let scale = |v: f32| ((v.max(0.0) * ratio).floor() as u32).max(1);
        (scale(logical_width), scale(logical_height))
    }
}

/// Grid size for `resolution` cells on the short axis, preserving the
/// surface aspect ratio so the longer axis gets more cells.
pub fn grid_resolution(resolution: u32, surface_width: u32, surface_height: u32) -> (u32, u32) {
    let width = surface_width.max(1) as f32;
    let height = surface_height.max(1) as f32;
    let mut aspect = width / height;
    if aspect < 1.0 {
        aspect = 1.0 / aspect;
    }

    let min = (resolution as f32).round().max(1.0) as u32;
    let max = (resolution as f32 * aspect).round().max(1.0) as u32;

    if width > height {
        (max, min)
    } else {
        (min, max)
    }
}

/// Scale a grid down so neither axis exceeds `limit`, keeping its aspect.
pub fn fit_grid(size: (u32, u32), limit: u32) -> (u32, u32) {
    let (width, height) = size;
    let limit = limit.max(1);
    let longest = width.max(height);
    if longest <= limit {
        return size;
    }

    let fit = |v: u32| ((v as u64 * limit as u64 / longest as u64) as u32).max(1);
    if width >= height {
        (limit, fit(height))
    } else {
        (fit(width), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SimulationConfig::from_toml_str(
            "sim_resolution = 128\npointer_mode = \"multi_touch\"\n",
        )
        .unwrap();
        assert_eq!(config.sim_resolution, 128);
        assert_eq!(config.pointer_mode, PointerMode::MultiTouch);
        assert_eq!(config.dye_resolution, 384);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_json_config() {
        let config =
            SimulationConfig::from_json_str(r#"{"curl": 0.5, "seed": 7, "shading": true}"#)
                .unwrap();
        assert_eq!(config.curl, 0.5);
        assert_eq!(config.seed, Some(7));
        assert!(config.shading);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            SimulationConfig::from_toml_str("sim_resolution = 0"),
            Err(FluidError::InvalidConfig(_))
        ));
        assert!(matches!(
            SimulationConfig::from_toml_str("splat_radius = -1.0"),
            Err(FluidError::InvalidConfig(_))
        ));
        assert!(matches!(
            SimulationConfig::from_toml_str("curl = \"lots\""),
            Err(FluidError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "dye_resolution = 512\ntarget_fps = 60.0").unwrap();

        let config = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(config.dye_resolution, 512);
        assert_eq!(config.target_fps, 60.0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SimulationConfig::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(FluidError::Io(_))));
    }

    #[test]
    fn test_iterations_capped() {
        let config = SimulationConfig {
            pressure_iterations: 80,
            ..SimulationConfig::default()
        };
        assert_eq!(config.effective_pressure_iterations(), grid::MAX_PRESSURE_ITERATIONS);
    }

    #[test]
    fn test_no_linear_filter_clamps_dye_and_disables_shading() {
        let mut config = SimulationConfig {
            dye_resolution: 1024,
            shading: true,
            ..SimulationConfig::default()
        };
        config.apply_capabilities(&CapabilityProfile::half_float().without_linear_filter());
        assert_eq!(config.dye_resolution, grid::SAFE_DYE_RESOLUTION_MAX);
        assert!(!config.shading);

        let mut small = SimulationConfig {
            dye_resolution: 64,
            ..SimulationConfig::default()
        };
        small.apply_capabilities(&CapabilityProfile::half_float().without_linear_filter());
        assert_eq!(small.dye_resolution, grid::SAFE_DYE_RESOLUTION_MIN);

        let mut untouched = SimulationConfig {
            dye_resolution: 1024,
            ..SimulationConfig::default()
        };
        untouched.apply_capabilities(&CapabilityProfile::half_float());
        assert_eq!(untouched.dye_resolution, 1024);
    }

    #[test]
    fn test_grid_resolution_follows_aspect() {
        assert_eq!(grid_resolution(56, 800, 600), (75, 56));
        assert_eq!(grid_resolution(56, 600, 800), (56, 75));
        assert_eq!(grid_resolution(56, 500, 500), (56, 56));
        assert_eq!(grid_resolution(1, 1, 10_000), (1, 10_000));
    }

    #[test]
    fn test_fit_grid_keeps_aspect_under_limit() {
        assert_eq!(fit_grid((2112, 384), 2048), (2048, 372));
        assert_eq!(fit_grid((384, 2112), 2048), (372, 2048));
        assert_eq!(fit_grid((75, 56), 2048), (75, 56));
        assert_eq!(fit_grid((5000, 1), 100), (100, 1));
    }

    #[test]
    fn test_surface_pixels_clamps_ratio() {
        let config = SimulationConfig::default();
        assert_eq!(config.surface_pixels(800.0, 600.0, 2.0), (800, 600));

        let retina = SimulationConfig {
            max_pixel_ratio: 2.0,
            ..SimulationConfig::default()
        };
        assert_eq!(retina.surface_pixels(800.0, 600.0, 3.0), (1600, 1200));
        assert_eq!(retina.surface_pixels(0.0, 10.0, 1.0), (1, 10));
    }

    #[test]
    fn test_pixel_ratio_capped() {
        let config = SimulationConfig::default();
        assert_eq!(config.pixel_ratio(2.5), 1.0);
        assert_eq!(config.pixel_ratio(0.5), 0.5);
        assert_eq!(config.pixel_ratio(f32::NAN), 1.0);
    }

    #[test]
    fn test_low_end_tier() {
        let config = SimulationConfig::for_tier(DeviceTier::LowEnd);
        assert_eq!(config.sim_resolution, 40);
        assert_eq!(config.dye_resolution, 256);
        assert_eq!(config.pressure_iterations, 3);
        assert_eq!(config.splat_force, 1600.0);
        assert_eq!(config.velocity_dissipation, 2.2);
    }
}
