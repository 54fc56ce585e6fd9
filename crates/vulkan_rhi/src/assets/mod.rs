//! Decoded image data consumed by the texture loader

pub mod image_loader;

pub use image_loader::ImageData;

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// File could not be read or decoded
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Decoded data does not match the declared dimensions
    #[error("Invalid image data: {0}")]
    InvalidData(String),
}
