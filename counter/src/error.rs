//! Error types for the vehicle counting service

use thiserror::Error;

/// Result type alias for the vehicle counting service
pub type Result<T> = std::result::Result<T, CounterError>;

#[derive(Error, Debug)]
pub enum CounterError {
    #[error("Frame decode failed: {0}")]
    DecodeError(String),

    #[error("Detector failed: {0}")]
    DetectorError(String),

    #[error("Detector unavailable after {failures} consecutive failures")]
    DetectorUnavailable { failures: u32 },

    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Tracking failed: {0:#}")]
    TrackingError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CounterError {
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::DecodeError(msg.into())
    }

    pub fn detector<S: Into<String>>(msg: S) -> Self {
        Self::DetectorError(msg.into())
    }

    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadError(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::TransportError(msg.into())
    }

    /// Whether the error ends the session that raised it
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::DecodeError(_)
                | Self::DetectorError(_)
                | Self::ImageError(_)
                | Self::Base64Error(_)
        )
    }
}
