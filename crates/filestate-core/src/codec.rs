//! Gzip and base64 transforms used to build snapshot artifacts.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::ProvisionError;

/// Gzip `reader` into `writer` at best compression.
pub fn compress_stream<R: Read, W: Write>(mut reader: R, writer: W) -> Result<W, ProvisionError> {
    let mut encoder = GzEncoder::new(writer, Compression::best());
    std::io::copy(&mut reader, &mut encoder)
        .map_err(|e| ProvisionError::Codec(format!("gzip failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| ProvisionError::Codec(format!("gzip failed: {}", e)))
}

/// Standard-alphabet base64 (with padding) of `reader` into `writer`.
pub fn encode_stream<R: Read, W: Write>(mut reader: R, writer: W) -> Result<W, ProvisionError> {
    let mut encoder = base64::write::EncoderWriter::new(writer, &STANDARD);
    std::io::copy(&mut reader, &mut encoder)
        .map_err(|e| ProvisionError::Codec(format!("base64 encoding failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| ProvisionError::Codec(format!("base64 encoding failed: {}", e)))
}

/// Gzip an in-memory buffer.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, ProvisionError> {
    compress_stream(data, Vec::new())
}

/// Reverse of [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ProvisionError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| ProvisionError::Codec(format!("gunzip failed: {}", e)))?;
    Ok(out)
}

/// Base64-encode an in-memory buffer.
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Reverse of [`encode`].
pub fn decode(encoded: &str) -> Result<Vec<u8>, ProvisionError> {
    STANDARD
        .decode(encoded.trim_end())
        .map_err(|e| ProvisionError::Codec(format!("base64 decoding failed: {}", e)))
}
