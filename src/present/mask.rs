use std::borrow::Cow;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::config::fit_grid;
use crate::error::{FluidError, FluidResult};

/// RGBA8 image the mask display pass distorts with the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl MaskImage {
    /// Wrap raw RGBA8 pixels, row-major from the top row.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> FluidResult<Self> {
        if width == 0 || height == 0 {
            return Err(FluidError::Mask(format!(
                "mask must not be empty, got {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(FluidError::Mask(format!(
                "{}x{} mask needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decode any format the `image` crate understands (PNG, JPEG, ...).
    pub fn from_encoded(bytes: &[u8]) -> FluidResult<Self> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| FluidError::Mask(format!("decode failed: {}", e)))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Self::from_rgba8(width, height, decoded.into_raw())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> FluidResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let mask = Self::from_encoded(&bytes)?;
        log::info!(
            "[MaskImage::load] {} ({}x{})",
            path.as_ref().display(),
            mask.width,
            mask.height
        );
        Ok(mask)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// This mask, downscaled if either side exceeds `limit` texels.
    pub fn fit_within(&self, limit: u32) -> FluidResult<Cow<'_, MaskImage>> {
        let (width, height) = fit_grid((self.width, self.height), limit);
        if (width, height) == (self.width, self.height) {
            return Ok(Cow::Borrowed(self));
        }

        let source = RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| FluidError::Mask("pixel buffer does not match size".to_string()))?;
        let scaled = imageops::resize(&source, width, height, FilterType::Triangle);
        log::info!(
            "[MaskImage::fit_within] {}x{} mask scaled to {}x{}",
            self.width,
            self.height,
            width,
            height
        );
        Self::from_rgba8(width, height, scaled.into_raw()).map(Cow::Owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageOutputFormat, Rgba};
    use std::io::Cursor;

    #[test]
    fn test_raw_size_checked() {
        assert!(MaskImage::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            MaskImage::from_rgba8(2, 2, vec![0; 15]),
            Err(FluidError::Mask(_))
        ));
        assert!(matches!(
            MaskImage::from_rgba8(0, 2, Vec::new()),
            Err(FluidError::Mask(_))
        ));
    }

    #[test]
    fn test_decodes_png() {
        let image: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_fn(3, 2, |x, _| Rgba([x as u8 * 100, 0, 0, 255]));
        let mut encoded = Cursor::new(Vec::new());
        image.write_to(&mut encoded, ImageOutputFormat::Png).unwrap();

        let mask = MaskImage::from_encoded(encoded.get_ref()).unwrap();
        assert_eq!((mask.width(), mask.height()), (3, 2));
        assert_eq!(&mask.pixels()[4..8], &[100, 0, 0, 255]);
        assert!((mask.aspect() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_oversized_mask_scaled_to_limit() {
        let mask = MaskImage::from_rgba8(400, 100, vec![200; 400 * 100 * 4]).unwrap();
        let fitted = mask.fit_within(64).unwrap();
        assert_eq!((fitted.width(), fitted.height()), (64, 16));
        assert_eq!(fitted.pixels().len(), 64 * 16 * 4);
        assert!(fitted.pixels().iter().all(|&v| (199..=201).contains(&v)));

        let small = mask.fit_within(4096).unwrap();
        assert!(matches!(small, Cow::Borrowed(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            MaskImage::from_encoded(b"not an image"),
            Err(FluidError::Mask(_))
        ));
    }
}
