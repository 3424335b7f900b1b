use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::GrayImage;

use crate::errors::InferenceError;

/// Decode a frame payload into image bytes
///
/// Accepts bare base64 or a `data:image/...;base64,` URL as produced by
/// `canvas.toDataURL()`.
pub fn decode_frame(payload: &str, max_bytes: usize) -> Result<Vec<u8>, InferenceError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(InferenceError::InvalidFrame("empty payload".to_string()));
    }

    let encoded = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (header, body) = rest
                .split_once(',')
                .ok_or_else(|| InferenceError::InvalidFrame("data URL without ','".to_string()))?;
            if !header.ends_with(";base64") {
                return Err(InferenceError::InvalidFrame(format!(
                    "unsupported data URL encoding '{}'",
                    header
                )));
            }
            body
        }
        None => payload,
    };

    // Reject oversized payloads before allocating the decoded buffer
    let estimated = encoded.len() / 4 * 3;
    if estimated > max_bytes + 2 {
        return Err(InferenceError::FrameTooLarge {
            size: estimated,
            limit: max_bytes,
        });
    }

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| InferenceError::InvalidFrame(format!("invalid base64: {}", e)))?;

    check_frame_size(bytes.len(), max_bytes)?;
    if bytes.is_empty() {
        return Err(InferenceError::InvalidFrame("empty image".to_string()));
    }

    Ok(bytes)
}

/// Fail when a frame is larger than `max_bytes`
pub fn check_frame_size(size: usize, max_bytes: usize) -> Result<(), InferenceError> {
    if size > max_bytes {
        return Err(InferenceError::FrameTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}

/// Decode JPEG or PNG bytes into an 8-bit grayscale image
pub fn load_grayscale(bytes: &[u8]) -> Result<GrayImage, InferenceError> {
    let image = image::load_from_memory(bytes).map_err(|e| InferenceError::ImageDecode(e.to_string()))?;
    let gray = image.to_luma8();

    if gray.width() == 0 || gray.height() == 0 {
        return Err(InferenceError::ImageDecode("image has no pixels".to_string()));
    }

    Ok(gray)
}
