use crate::models::ImageSource;
use crate::vision::VisionError;

use base64::{engine::general_purpose, Engine as _};
use std::path::Path;
use tracing::debug;

/// Read an image file and wrap it as base64 `content` for the analyze payload.
pub async fn encode_image_file<P: AsRef<Path>>(path: P) -> Result<ImageSource, VisionError> {
    let path = path.as_ref();

    // Validate file exists
    if !path.exists() {
        return Err(VisionError::InvalidImage(format!(
            "Image file not found: {path:?}"
        )));
    }

    // Read image file
    let bytes = tokio::fs::read(path).await?;
    validate_image_format(path, &bytes)?;

    debug!("Encoding image {:?} ({} bytes)", path, bytes.len());
    Ok(ImageSource::Content(general_purpose::STANDARD.encode(&bytes)))
}

/// Check the extension against the magic bytes of the common formats the API
/// accepts.
pub fn validate_image_format<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), VisionError> {
    let extension = path
        .as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    // Check file extension
    if !matches!(
        extension.as_str(),
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp"
    ) {
        return Err(VisionError::InvalidImage(format!(
            "Unsupported image extension: {extension}"
        )));
    }

    // Check magic bytes for the extension
    if bytes.len() < 12 {
        return Err(VisionError::InvalidImage("Image file too small".into()));
    }

    let is_valid = match extension.as_str() {
        "jpg" | "jpeg" => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        "png" => bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
        "gif" => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
        "bmp" => bytes.starts_with(b"BM"),
        "webp" => bytes.starts_with(b"RIFF") && bytes[8..12] == *b"WEBP",
        _ => false,
    };

    if !is_valid {
        return Err(VisionError::InvalidImage(format!(
            "Invalid {extension} file format"
        )));
    }

    Ok(())
}
