//! Image metadata consumed by shading graph construction.

use crate::error::Result;
use crate::texture::ImageHandle;
use image::ImageFormat;
use std::collections::HashMap;

/// What the shading builders need to know about an image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    /// Path the image was read from.
    pub file_path: String,
    /// Path written into asset references.
    pub ref_path: String,
    /// Number of channels (1-4).
    pub channel_count: u8,
    /// Whether the target renderer will treat the image as sRGB-encoded
    /// regardless of what the material declares.
    pub srgb_in_target: bool,
}

impl ImageMetadata {
    pub fn new(path: impl Into<String>, channel_count: u8, srgb_in_target: bool) -> Self {
        let path = path.into();
        Self {
            file_path: path.clone(),
            ref_path: path,
            channel_count,
            srgb_in_target,
        }
    }

    pub fn with_ref_path(mut self, ref_path: impl Into<String>) -> Self {
        self.ref_path = ref_path.into();
        self
    }
}

/// Read-only lookup shared by every material of a conversion run.
pub type ImageMetadataMap = HashMap<ImageHandle, ImageMetadata>;

/// File extension matching the encoded data, if it is a supported format.
pub fn guess_extension(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data).ok()? {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        _ => None,
    }
}

/// Probe encoded image bytes for channel count and bit depth.
///
/// 8-bit images are flagged as auto-sRGB since the target's image loader
/// assumes sRGB for them independent of any declared color space.
pub fn probe_image(data: &[u8], path: &str) -> Result<ImageMetadata> {
    let format = image::guess_format(data)?;
    let decoded = image::load_from_memory_with_format(data, format)?;
    let color = decoded.color();
    let channel_count = color.channel_count();
    let bits_per_channel = color.bits_per_pixel() / u16::from(channel_count.max(1));
    log::debug!(
        "probed {}: {:?}, {} channels, {} bits",
        path,
        format,
        channel_count,
        bits_per_channel
    );
    Ok(ImageMetadata::new(path, channel_count, bits_per_channel == 8))
}
