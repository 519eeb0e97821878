//! Memory payloads are shipped as `gz:` followed by base64 encoded, gzipped JSON.

use crate::PayloadError;
use base64::{
    engine::general_purpose,
    Engine as _,
};
use flate2::{
    read::GzDecoder,
    write::GzEncoder,
    Compression,
};
use serde_json::Value;
use std::io::Read as _;

pub const COMPRESSED_PREFIX: &str = "gz:";

pub fn is_compressed(data: &str) -> bool {
    data.starts_with(COMPRESSED_PREFIX)
}

pub fn decode_compressed(data: &str) -> Result<Value, PayloadError> {
    let encoded = data
        .strip_prefix(COMPRESSED_PREFIX)
        .ok_or(PayloadError::MissingPrefix)?;
    let compressed = general_purpose::STANDARD.decode(encoded.trim())?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

pub fn encode_compressed(value: &Value) -> Result<String, PayloadError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut encoder, value)?;
    let compressed = encoder.finish()?;
    Ok(format!("{COMPRESSED_PREFIX}{}", general_purpose::STANDARD.encode(compressed)))
}
