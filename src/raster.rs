//! CPU-side raster image type and pixel helpers.

use std::path::Path;

use anyhow::{Context, Result};

/// An RGBA8 pixel buffer. This is the only pixel currency the engine speaks:
/// sources are converted to RGBA on load and read-backs always produce RGBA.
#[derive(Debug, Clone)]
pub struct RasterImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Raw RGBA8 pixel data, row-major, tightly packed
    pub data: Vec<u8>,
}

impl RasterImage {
    /// Creates a zeroed (transparent black) image of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        let size = (width as usize) * (height as usize) * 4;
        Self {
            width,
            height,
            data: vec![0; size],
        }
    }

    /// Creates an image from existing RGBA8 data.
    pub fn from_data(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize) * 4);
        Self {
            width,
            height,
            data,
        }
    }

    /// Creates an image filled with a single RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Decodes an image file into RGBA8.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode image {:?}", path))?
            .into_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self::from_data(width, height, decoded.into_raw()))
    }

    /// Encodes the image to a file; the format is inferred from the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let buffer =
            image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
                .context("raster buffer does not match its declared dimensions")?;
        buffer
            .save(path)
            .with_context(|| format!("failed to write image {:?}", path))
    }

    /// Returns the pixel at (x, y). Debug-checked bounds; callers stay in range.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }
}

/// Unpacks an ARGB packed int into normalized `[r, g, b, a]` channels.
pub fn argb_channels(argb: u32) -> [f64; 4] {
    let a = ((argb >> 24) & 0xff) as f64 / 255.0;
    let r = ((argb >> 16) & 0xff) as f64 / 255.0;
    let g = ((argb >> 8) & 0xff) as f64 / 255.0;
    let b = (argb & 0xff) as f64 / 255.0;
    [r, g, b, a]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_fill() {
        let img = RasterImage::solid(2, 2, [255, 0, 0, 255]);
        assert_eq!(img.data.len(), 16);
        assert_eq!(img.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(img.pixel(1, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn test_argb_unpack() {
        let [r, g, b, a] = argb_channels(0xFF00_80FF);
        assert_eq!(a, 1.0);
        assert_eq!(r, 0.0);
        assert!((g - 128.0 / 255.0).abs() < 1e-9);
        assert_eq!(b, 1.0);
    }

    #[test]
    fn test_new_is_transparent() {
        let img = RasterImage::new(3, 1);
        assert_eq!(img.data, vec![0; 12]);
    }
}
