use glam::{Vec2, Vec4};

use crate::gpu::capability::StorageFormat;
use crate::targets::FilterMode;

/// Host texture: RGBA texels, row-major from the top row.
#[derive(Debug, Clone)]
pub(crate) struct Grid {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub filter: FilterMode,
    pub texels: Vec<[f32; 4]>,
}

impl Grid {
    pub fn new(width: u32, height: u32, channels: usize, filter: FilterMode) -> Self {
        Self {
            width,
            height,
            channels,
            filter,
            texels: vec![[0.0; 4]; (width * height) as usize],
        }
    }

    pub fn texel(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        Vec4::from_array(self.texels[y * self.width as usize + x])
    }

    /// Sample with clamp-to-edge addressing.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let w = self.width as f32;
        let h = self.height as f32;
        match self.filter {
            FilterMode::Nearest => {
                self.texel((uv.x * w).floor() as i64, (uv.y * h).floor() as i64)
            }
            FilterMode::Linear => {
                let fx = uv.x * w - 0.5;
                let fy = uv.y * h - 0.5;
                let x0 = fx.floor();
                let y0 = fy.floor();
                let tx = fx - x0;
                let ty = fy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);

                let top = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), tx);
                let bottom = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), tx);
                top.lerp(bottom, ty)
            }
        }
    }
}

/// Store a shaded value the way a target with `channels` channels would hold it.
pub(crate) fn store(channels: usize, value: Vec4, storage: StorageFormat) -> [f32; 4] {
    let mut out = value.to_array();
    for channel in out.iter_mut().take(3).skip(channels) {
        *channel = 0.0;
    }
    if channels < 4 {
        out[3] = 1.0;
    }
    match storage {
        StorageFormat::Unorm8 => {
            for channel in out.iter_mut() {
                *channel = (channel.clamp(0.0, 1.0) * 255.0).round() / 255.0;
            }
        }
        StorageFormat::HalfFloat => {
            for channel in out.iter_mut() {
                *channel = round_to_half(*channel);
            }
        }
        StorageFormat::Float => {}
    }
    out
}

/// Round to the nearest value an IEEE binary16 texel can hold.
pub(crate) fn round_to_half(value: f32) -> f32 {
    if !value.is_finite() {
        return value;
    }
    let magnitude = value.abs();
    if magnitude >= 65520.0 {
        return f32::INFINITY.copysign(value);
    }
    // 11 significant bits for normals, a fixed 2^-24 step below 2^-14
    let exponent = ((magnitude.to_bits() >> 23) & 0xff) as i32 - 127;
    let step = 2f32.powi(exponent.max(-14) - 10);
    (value / step).round() * step
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Grid {
        let mut grid = Grid::new(2, 1, 4, FilterMode::Linear);
        grid.texels = vec![[0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0]];
        grid
    }

    #[test]
    fn test_linear_sampling_interpolates_between_centres() {
        let grid = ramp();
        assert!((grid.sample(Vec2::new(0.5, 0.5)).x - 0.5).abs() < 1e-6);
        assert_eq!(grid.sample(Vec2::new(0.25, 0.5)).x, 0.0);
        assert_eq!(grid.sample(Vec2::new(0.75, 0.5)).x, 1.0);
    }

    #[test]
    fn test_sampling_clamps_to_edge() {
        let grid = ramp();
        assert_eq!(grid.sample(Vec2::new(-3.0, 0.5)).x, 0.0);
        assert_eq!(grid.sample(Vec2::new(7.0, 2.0)).x, 1.0);

        let nearest = Grid {
            filter: FilterMode::Nearest,
            ..ramp()
        };
        assert_eq!(nearest.sample(Vec2::new(0.49, 0.5)).x, 0.0);
        assert_eq!(nearest.sample(Vec2::new(1.5, 0.5)).x, 1.0);
    }

    #[test]
    fn test_store_drops_missing_channels() {
        let stored = store(2, Vec4::new(1.0, 2.0, 3.0, 4.0), StorageFormat::HalfFloat);
        assert_eq!(stored, [1.0, 2.0, 0.0, 1.0]);

        let stored = store(4, Vec4::new(-1.0, 0.5, 2.0, 1.0), StorageFormat::Unorm8);
        assert_eq!(stored[0], 0.0);
        assert_eq!(stored[2], 1.0);
    }

    #[test]
    fn test_half_float_storage_rounds_like_binary16() {
        let stored = store(4, Vec4::new(1.0001, 0.1, 3.0, 1e-8), StorageFormat::HalfFloat);
        assert_eq!(stored[0], 1.0);
        assert_eq!(stored[1], 0.099_975_586);
        assert_eq!(stored[2], 3.0);
        assert_eq!(stored[3], 0.0);

        assert_eq!(round_to_half(-2050.7), -2050.0);
        assert_eq!(round_to_half(70000.0), f32::INFINITY);

        let full = store(4, Vec4::new(1.0001, 0.1, 3.0, 1e-8), StorageFormat::Float);
        assert_eq!(full[0], 1.0001);
    }
}
