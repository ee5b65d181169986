//! Archive encoding: gzip, then standard base64.

use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid gzip stream: {0}")]
    Gzip(#[from] std::io::Error),
}

/// Compress `text` and return it as a single base64 line.
pub fn encode(text: &str) -> Result<String, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}

/// Inverse of [`encode`]. Surrounding whitespace is ignored.
pub fn decode(encoded: &str) -> Result<String, CodecError> {
    let compressed = BASE64.decode(encoded.trim())?;
    let mut text = String::new();
    GzDecoder::new(compressed.as_slice()).read_to_string(&mut text)?;
    Ok(text)
}
