//! Inbound frame decoding

use crate::error::{CounterError, Result};
use crate::types::ImageData;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a connection delivers its frames. One convention per connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameEncoding {
    /// Text messages carrying a base64 image, optionally as a data URL
    #[default]
    Base64,
    /// Binary messages carrying the encoded image bytes
    Binary,
}

impl fmt::Display for FrameEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64 => write!(f, "base64"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Decode a base64 payload such as `data:image/jpeg;base64,/9j/4AAQ...`
pub fn decode_base64_frame(payload: &str) -> Result<ImageData> {
    let encoded = match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    };
    let bytes = STANDARD.decode(encoded.trim())?;
    decode_binary_frame(&bytes)
}

pub fn decode_binary_frame(bytes: &[u8]) -> Result<ImageData> {
    if bytes.is_empty() {
        return Err(CounterError::decode("empty frame payload"));
    }
    ImageData::from_bytes(bytes)
}
