// Fluid backdrop constants - SINGLE SOURCE OF TRUTH
//
// Tuning values shared by the CPU reference kernels, the WGSL passes and the
// host drivers. Shaders receive the ones they need through the uniform block,
// never as literals in WGSL.

/// Simulation timing
pub mod timing {
    /// Upper bound for a single integration step (seconds).
    pub const MAX_DT: f32 = 0.016_666;

    /// Default presentation cap used by the backdrop.
    pub const DEFAULT_TARGET_FPS: f32 = 35.0;

    /// Number of frames kept in the rolling frame-time history (about 2s at 60 FPS).
    pub const FRAME_HISTORY: usize = 120;

    /// Frames between periodic `debug` statistics lines.
    pub const STATS_LOG_INTERVAL: u64 = 300;
}

/// Grid and render-target limits
pub mod grid {
    /// Dye resolution range used when float linear filtering is unavailable.
    pub const SAFE_DYE_RESOLUTION_MIN: u32 = 256;
    pub const SAFE_DYE_RESOLUTION_MAX: u32 = 512;

    /// Jacobi iterations are clamped to this many per tick.
    pub const MAX_PRESSURE_ITERATIONS: u32 = 16;

    /// Largest grid dimension accepted by config validation.
    pub const MAX_GRID_RESOLUTION: u32 = 4096;

    /// Texture dimension assumed until a device reports its own limit.
    pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

    /// Velocity components are clamped to +/- this after vorticity confinement.
    pub const VELOCITY_LIMIT: f32 = 1000.0;

    /// Epsilon added to the curl-gradient length before normalising.
    pub const CURL_GRADIENT_EPSILON: f32 = 0.0001;
}

/// Surface handling
pub mod surface {
    /// Device pixel ratio clamp that bounds render-target memory.
    pub const DEFAULT_MAX_PIXEL_RATIO: f32 = 1.0;

    /// Surfaces narrower than this count towards the low-end tier.
    pub const LOW_END_VIEWPORT_WIDTH: u32 = 768;

    /// Hardware threads at or below this count towards the low-end tier.
    pub const LOW_END_CORE_COUNT: usize = 4;
}

/// Pointer and splat tuning
pub mod splat {
    /// Config splat radius is divided by this before reaching the shader.
    pub const RADIUS_SCALE: f32 = 100.0;

    /// Generated colours are scaled down by this to keep the backdrop subtle.
    pub const COLOR_INTENSITY: f32 = 0.15;

    /// Tap splats boost the pointer colour by this factor.
    pub const CLICK_COLOR_BOOST: f32 = 10.0;

    /// Tap impulse ranges: dx in +/- 5, dy in +/- 15.
    pub const CLICK_FORCE_X: f32 = 10.0;
    pub const CLICK_FORCE_Y: f32 = 30.0;

    /// Synthetic id used for the always-present mouse pointer.
    pub const AMBIENT_POINTER_ID: i64 = -1;
}

/// GPU plumbing
pub mod gpu {
    /// Byte stride between per-draw uniform slots (WebGPU minimum offset alignment).
    pub const UNIFORM_SLOT_STRIDE: u64 = 256;

    /// Uniform slots available before an intermediate submit is forced.
    pub const UNIFORM_SLOTS_PER_SUBMIT: u64 = 128;

    /// Texture slots every program declares.
    pub const TEXTURE_SLOTS: usize = 3;
}
