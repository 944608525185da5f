//! Response body validation.

use bytes::Bytes;
use image::ImageFormat;

use crate::{BackendError, GeneratedImage};

const SNIPPET_CHARS: usize = 200;

/// Accept `bytes` only if they look like an image we can serve.
///
/// A textual content type is rejected up front; otherwise the format is
/// sniffed from the leading magic bytes.
pub fn sniff_image(bytes: Bytes, content_type: Option<&str>) -> Result<GeneratedImage, BackendError> {
    if bytes.is_empty() {
        return Err(BackendError::InvalidPayload("empty body".into()));
    }

    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.starts_with("application/json") || ct.starts_with("text/") {
            return Err(BackendError::InvalidPayload(format!(
                "{ct} body: {}",
                snippet(&bytes)
            )));
        }
    }

    let format = image::guess_format(&bytes)
        .map_err(|_| BackendError::InvalidPayload(format!("unrecognised bytes: {}", snippet(&bytes))))?;

    let extension = match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        other => {
            return Err(BackendError::InvalidPayload(format!(
                "unsupported image format {other:?}"
            )));
        }
    };

    Ok(GeneratedImage { bytes, extension })
}

fn snippet(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().count() > SNIPPET_CHARS {
        out.push_str("...");
    }
    out
}
