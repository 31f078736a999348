//! Domain Services
//!
//! Pure domain logic: signature payload validation and calendar-day bucketing.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use thiserror::Error;

/// Bounds on the decoded signature image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureLimits {
    /// Anything smaller is treated as a blank stroke
    pub min_bytes: usize,
    pub max_bytes: usize,
}

impl Default for SignatureLimits {
    fn default() -> Self {
        Self {
            min_bytes: 256,
            max_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    fn sniff(bytes: &[u8]) -> Option<Self> {
        const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        if bytes.starts_with(PNG) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature is not valid base64")]
    Encoding,

    #[error("signature is not a PNG, JPEG or WebP image")]
    UnsupportedFormat,

    #[error("signature is too small to contain a stroke")]
    TooSmall,

    #[error("signature exceeds the size limit")]
    TooLarge,
}

/// Structurally valid signature, normalized to a data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSignature {
    pub format: ImageFormat,
    pub byte_len: usize,
    pub data_url: String,
}

/// Validate a data URL (`data:image/png;base64,...`) or bare base64 image
pub fn validate_signature(
    raw: &str,
    limits: &SignatureLimits,
) -> Result<ValidatedSignature, SignatureError> {
    let raw = raw.trim();
    let (declared_mime, encoded) = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest.split_once(',').ok_or(SignatureError::Encoding)?;
            let mime = meta
                .strip_suffix(";base64")
                .ok_or(SignatureError::Encoding)?;
            (Some(mime.to_ascii_lowercase()), data)
        }
        None => (None, raw),
    };

    // Reject oversized payloads before decoding them
    if encoded.len() / 4 * 3 > limits.max_bytes + 3 {
        return Err(SignatureError::TooLarge);
    }

    let bytes = platform::crypto::from_base64(encoded).map_err(|_| SignatureError::Encoding)?;
    if bytes.len() > limits.max_bytes {
        return Err(SignatureError::TooLarge);
    }
    if bytes.len() < limits.min_bytes {
        return Err(SignatureError::TooSmall);
    }

    let format = ImageFormat::sniff(&bytes).ok_or(SignatureError::UnsupportedFormat)?;
    if declared_mime.is_some_and(|mime| mime != format.mime()) {
        return Err(SignatureError::UnsupportedFormat);
    }

    Ok(ValidatedSignature {
        format,
        byte_len: bytes.len(),
        data_url: format!("data:{};base64,{}", format.mime(), encoded),
    })
}

/// Calendar day of `now_ms` at a fixed UTC offset
pub fn attendance_date(now_ms: i64, utc_offset_minutes: i32) -> NaiveDate {
    let offset =
        FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix());
    DateTime::<Utc>::from_timestamp_millis(now_ms)
        .unwrap_or_default()
        .with_timezone(&offset)
        .date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::crypto::to_base64;

    fn png(len: usize) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.resize(len, 0x42);
        bytes
    }

    #[test]
    fn test_data_url_and_bare_base64() {
        let limits = SignatureLimits::default();
        let b64 = to_base64(&png(512));

        let from_url = validate_signature(&format!("data:image/png;base64,{b64}"), &limits).unwrap();
        let bare = validate_signature(&b64, &limits).unwrap();
        assert_eq!(from_url, bare);
        assert_eq!(bare.format, ImageFormat::Png);
        assert_eq!(bare.byte_len, 512);
    }

    #[test]
    fn test_size_bounds() {
        let limits = SignatureLimits {
            min_bytes: 256,
            max_bytes: 1024,
        };
        assert_eq!(
            validate_signature(&to_base64(&png(100)), &limits),
            Err(SignatureError::TooSmall)
        );
        assert_eq!(
            validate_signature(&to_base64(&png(1025)), &limits),
            Err(SignatureError::TooLarge)
        );
        assert_eq!(
            validate_signature(&to_base64(&png(64 * 1024)), &limits),
            Err(SignatureError::TooLarge)
        );
        assert!(validate_signature(&to_base64(&png(1024)), &limits).is_ok());
    }

    #[test]
    fn test_rejects_bad_encoding_and_format() {
        let limits = SignatureLimits::default();
        assert_eq!(
            validate_signature("data:image/png;base64,!!!!", &limits),
            Err(SignatureError::Encoding)
        );
        assert_eq!(
            validate_signature("data:image/png,abcd", &limits),
            Err(SignatureError::Encoding)
        );
        assert_eq!(
            validate_signature(&to_base64(&[0u8; 512]), &limits),
            Err(SignatureError::UnsupportedFormat)
        );

        // declared type must match the content
        let b64 = to_base64(&png(512));
        assert_eq!(
            validate_signature(&format!("data:image/jpeg;base64,{b64}"), &limits),
            Err(SignatureError::UnsupportedFormat)
        );
    }

    #[test]
    fn test_attendance_date_offset() {
        // 2025-03-10T03:30:00Z
        let now_ms = 1_741_577_400_000;
        assert_eq!(
            attendance_date(now_ms, 0),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );
        // Lima, UTC-5
        assert_eq!(
            attendance_date(now_ms, -300),
            NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()
        );
    }
}
