//! Image decoding into flat RGBA8 pixel buffers
//!
//! Decoding is handled by the `image` crate; the GPU resource layer only ever
//! sees tightly packed RGBA8 rows.

use std::path::Path;

use crate::assets::AssetError;

/// Bytes per RGBA8 pixel
const RGBA_CHANNELS: usize = 4;

/// Decoded image ready for a staging upload
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw RGBA pixel data, row-major, no padding
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load and decode an image file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();
        log::debug!("Loading image from: {:?}", path_ref);

        let img = image::open(path_ref)
            .map_err(|e| AssetError::LoadFailed(format!("{}: {}", path_ref.display(), e)))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::info!("Loaded image {}x{} from {:?}", width, height, path_ref);

        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Decode an image held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("in-memory image: {}", e)))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("Loaded image {}x{} from memory", width, height);

        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Wrap already-decoded RGBA8 pixels, checking the length
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self, AssetError> {
        let expected = width as usize * height as usize * RGBA_CHANNELS;
        if data.len() != expected {
            return Err(AssetError::InvalidData(format!(
                "{}x{} RGBA8 needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { data, width, height })
    }

    /// Two-color checkerboard with square cells
    pub fn checkerboard(width: u32, height: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut data = Vec::with_capacity(width as usize * height as usize * RGBA_CHANNELS);
        for y in 0..height {
            for x in 0..width {
                let color = if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b };
                data.extend_from_slice(&color);
            }
        }
        Self { data, width, height }
    }

    /// Size of the pixel data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_layout() {
        let img = ImageData::checkerboard(4, 4, 2, [255, 0, 0, 255], [0, 0, 255, 255]);
        assert_eq!(img.size_bytes(), 4 * 4 * 4);
        // (0,0) is cell a, (2,0) is cell b, (2,2) is a again
        assert_eq!(&img.data[0..4], &[255, 0, 0, 255]);
        assert_eq!(&img.data[8..12], &[0, 0, 255, 255]);
        let row2_col2 = (2 * 4 + 2) * 4;
        assert_eq!(&img.data[row2_col2..row2_col2 + 4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_from_rgba8_rejects_wrong_length() {
        assert!(ImageData::from_rgba8(2, 2, vec![0; 16]).is_ok());
        let err = ImageData::from_rgba8(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, AssetError::InvalidData(_)));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = ImageData::from_file("does/not/exist.png").unwrap_err();
        assert!(matches!(err, AssetError::LoadFailed(_)));
    }

    #[test]
    fn test_png_bytes_decode() {
        let mut encoded = Vec::new();
        let pixels = image::RgbaImage::from_raw(1, 1, vec![10, 20, 30, 255]).unwrap();
        pixels
            .write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Png)
            .unwrap();

        let decoded = ImageData::from_bytes(&encoded).unwrap();
        assert_eq!((decoded.width, decoded.height), (1, 1));
        assert_eq!(decoded.data, vec![10, 20, 30, 255]);
    }
}
