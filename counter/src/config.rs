//! Service configuration
//!
//! Every field has a default, so an empty JSON object is a valid config
//! file. The file is optional: `vehicle-counter [config.json]`, or the path
//! in `VEHICLE_COUNTER_CONFIG`. `VEHICLE_COUNTER_BIND` overrides the bind
//! address either way.

use crate::detector::DetectorConfig;
use crate::error::{CounterError, Result};
use crate::frame::FrameEncoding;
use ioutrack::TrackerConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_ENV: &str = "VEHICLE_COUNTER_CONFIG";
pub const BIND_ENV: &str = "VEHICLE_COUNTER_BIND";

/// Per-connection pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub frame_encoding: FrameEncoding,
    pub tracker: TrackerConfig,
    /// Consecutive detector failures after which the session is closed
    pub max_detector_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_encoding: FrameEncoding::Base64,
            tracker: TrackerConfig::default(),
            max_detector_failures: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub session: SessionConfig,
    pub detector: DetectorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            session: SessionConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CounterError::config(format!("{name} must be within [0, 1], got {value}")))
    }
}

impl ServerConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CounterError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Resolve the config from an optional CLI path, then the environment
    pub fn load(cli_path: Option<String>) -> Result<Self> {
        let path = cli_path.or_else(|| std::env::var(CONFIG_ENV).ok());
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path);
                Self::from_file(path)?
            }
            None => Self::default(),
        };

        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.bind_addr = bind;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_unit_interval("session.tracker.iou_threshold", self.session.tracker.iou_threshold)?;
        check_unit_interval(
            "detector.confidence_threshold",
            self.detector.confidence_threshold,
        )?;
        check_unit_interval("detector.iou_threshold", self.detector.iou_threshold)?;
        if self.session.max_detector_failures == 0 {
            return Err(CounterError::config(
                "session.max_detector_failures must be at least 1",
            ));
        }
        if self.detector.input_size == 0 {
            return Err(CounterError::config("detector.input_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorKind;
    use ioutrack::AssociationMethod;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = ServerConfig::from_json("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.session.tracker.max_age, 10);
        assert_eq!(config.session.tracker.min_hits, 1);
        assert_eq!(config.session.frame_encoding, FrameEncoding::Base64);
        assert_eq!(config.detector.kind, DetectorKind::Stub);
    }

    #[test]
    fn test_partial_override() {
        let config = ServerConfig::from_json(
            r#"{
                "bind_addr": "127.0.0.1:9001",
                "session": {
                    "frame_encoding": "binary",
                    "tracker": {"min_hits": 3, "association": "hungarian"}
                },
                "detector": {"kind": "onnx", "model_path": "yolo.onnx"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9001");
        assert_eq!(config.session.frame_encoding, FrameEncoding::Binary);
        assert_eq!(config.session.tracker.min_hits, 3);
        assert_eq!(config.session.tracker.max_age, 10);
        assert_eq!(config.session.tracker.association, AssociationMethod::Hungarian);
        assert_eq!(config.detector.kind, DetectorKind::Onnx);
        assert_eq!(config.detector.confidence_threshold, 0.25);
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        let err = ServerConfig::from_json(r#"{"session": {"tracker": {"iou_threshold": 1.5}}}"#)
            .unwrap_err();
        assert!(matches!(err, CounterError::ConfigError(_)));

        let err = ServerConfig::from_json(r#"{"session": {"max_detector_failures": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, CounterError::ConfigError(_)));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            ServerConfig::from_json("{bind_addr"),
            Err(CounterError::SerializationError(_))
        ));
    }
}
