//! Inline image handling for vision calls.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{AiError, Result};

/// A validated inline image ready to send as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime: &'static str,
    pub byte_len: usize,
    pub data_url: String,
}

/// Accept raw base64 or a `data:image/...;base64,` URL, check that it
/// decodes, and normalise it into a data URL with a sniffed MIME type.
pub fn inline_image(input: &str) -> Result<InlineImage> {
    let payload = match input.trim().strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| AiError::Validation("malformed data URL".into()))?;
            if !header.ends_with(";base64") {
                return Err(AiError::Validation(
                    "data URL must be base64 encoded".into(),
                ));
            }
            data
        }
        None => input.trim(),
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(AiError::Validation("image data must not be empty".into()));
    }

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| AiError::Validation(format!("image is not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(AiError::Validation("image data must not be empty".into()));
    }

    let mime = sniff_mime(&bytes);
    Ok(InlineImage {
        mime,
        byte_len: bytes.len(),
        data_url: format!("data:{};base64,{}", mime, compact),
    })
}

/// Guess the image type from magic bytes; JPEG when unknown.
fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}
