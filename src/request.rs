use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::errors::{RecognizeError, RecognizeResult};

/// A single capture or upload to recognize. Created per user action and
/// dropped once the result has been delivered.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub payload: ImagePayload,
    pub captured_at: SystemTime,
    /// Prior expression when re-recognizing the same capture.
    pub hint: Option<String>,
}

impl RecognitionRequest {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            payload: ImagePayload::Bytes(bytes),
            captured_at: SystemTime::now(),
            hint: None,
        }
    }

    pub fn from_data_uri(uri: impl Into<String>) -> Self {
        Self {
            payload: ImagePayload::DataUri(uri.into()),
            captured_at: SystemTime::now(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        if !hint.trim().is_empty() {
            self.hint = Some(hint);
        }
        self
    }
}

/// Raw image payload as produced by the camera widget (data URI) or a
/// file upload (bytes).
#[derive(Debug, Clone)]
pub enum ImagePayload {
    Bytes(Vec<u8>),
    DataUri(String),
}

impl ImagePayload {
    /// Returns the raw encoded image bytes, decoding a base64 data URI if
    /// necessary. A malformed data URI is an unreadable image like any
    /// other undecodable payload.
    pub fn to_bytes(&self) -> RecognizeResult<Vec<u8>> {
        match self {
            ImagePayload::Bytes(bytes) => Ok(bytes.clone()),
            ImagePayload::DataUri(uri) => decode_data_uri(uri),
        }
    }

    /// Sniffed mime type of the payload, for logging and provider params.
    pub fn sniff_mime(&self) -> Option<&'static str> {
        let bytes = match self {
            ImagePayload::Bytes(bytes) => bytes.clone(),
            ImagePayload::DataUri(uri) => decode_data_uri(uri).ok()?,
        };
        let kind = infer::get(&bytes)?;
        let mime = kind.mime_type();
        mime.starts_with("image/").then_some(mime)
    }
}

fn decode_data_uri(uri: &str) -> RecognizeResult<Vec<u8>> {
    let trimmed = uri.trim();
    let rest = trimmed
        .strip_prefix("data:")
        .ok_or_else(|| RecognizeError::image_decode("data URI missing 'data:' prefix"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| RecognizeError::image_decode("data URI missing ',' separator"))?;
    if !meta.ends_with(";base64") {
        return Err(RecognizeError::image_decode(
            "only base64 data URIs are supported",
        ));
    }
    BASE64
        .decode(payload.trim())
        .map_err(|err| RecognizeError::image_decode(format!("invalid base64 in data URI: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_payload_roundtrip() {
        let payload = ImagePayload::Bytes(vec![1, 2, 3]);
        assert_eq!(payload.to_bytes().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn data_uri_decodes() {
        let encoded = BASE64.encode(b"hello");
        let payload = ImagePayload::DataUri(format!("data:image/png;base64,{}", encoded));
        assert_eq!(payload.to_bytes().unwrap(), b"hello".to_vec());
    }

    #[test]
    fn malformed_data_uris_read_as_image_decode_failures() {
        // Only the three public errors may reach the caller; a payload
        // that never produced bytes is still an unreadable image.
        for uri in [
            "data:image/png,plain",
            "image/png;base64,AAAA",
            "data:image/png;base64,@@@",
        ] {
            let payload = ImagePayload::DataUri(uri.to_string());
            assert!(matches!(
                payload.to_bytes(),
                Err(RecognizeError::ImageDecode(_))
            ));
        }
    }

    #[test]
    fn sniffs_png_mime() {
        let image = image::RgbImage::new(4, 4);
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        let payload = ImagePayload::Bytes(bytes);
        assert_eq!(payload.sniff_mime(), Some("image/png"));
    }

    #[test]
    fn hint_ignores_blank_values() {
        let request = RecognitionRequest::from_bytes(vec![]).with_hint("  ");
        assert!(request.hint.is_none());
        let request = RecognitionRequest::from_bytes(vec![]).with_hint("5x^4");
        assert_eq!(request.hint.as_deref(), Some("5x^4"));
    }
}
