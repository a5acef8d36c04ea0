//! Detector adapter seam
//!
//! Sessions only see [`Detector`]. A single instance is built at startup and
//! shared by every session, so implementations must be `Send + Sync`.

use crate::error::{CounterError, Result};
use crate::types::{Detection, ImageData};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Common interface for object detectors
pub trait Detector: Send + Sync {
    /// Detect objects in a single frame. An empty list means nothing was
    /// found; failures are reported as errors.
    fn detect(&self, image: &ImageData) -> Result<Vec<Detection>>;

    /// Detector name (for logging and the status endpoint)
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Finds nothing; lets the service run without a model
    #[default]
    Stub,
    /// YOLO ONNX model (requires the `onnx` feature)
    Onnx,
}

/// Configuration for the detector adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    /// Path to the ONNX model file
    pub model_path: String,
    /// Minimum confidence for a detection to be reported (0-1)
    pub confidence_threshold: f32,
    /// IoU above which overlapping same-class boxes are suppressed (0-1)
    pub iou_threshold: f32,
    /// Square model input size in pixels
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Stub,
            model_path: "models/yolo11n.onnx".to_string(),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
        }
    }
}

impl DetectorKind {
    /// Create the detector this kind names
    pub fn build(&self, config: &DetectorConfig) -> Result<Arc<dyn Detector>> {
        match self {
            DetectorKind::Stub => Ok(Arc::new(StubDetector::new())),
            #[cfg(feature = "onnx")]
            DetectorKind::Onnx => Ok(Arc::new(crate::yolo::YoloDetector::new(config)?)),
            #[cfg(not(feature = "onnx"))]
            DetectorKind::Onnx => Err(CounterError::model_load(format!(
                "cannot load {}: built without the `onnx` feature",
                config.model_path
            ))),
        }
    }
}

/// Detector that never finds anything
#[derive(Debug, Default)]
pub struct StubDetector {
    warned: AtomicBool,
}

impl StubDetector {
    pub fn new() -> Self {
        info!("Creating stub detector, frames will report no vehicles");
        Self::default()
    }
}

impl Detector for StubDetector {
    fn detect(&self, image: &ImageData) -> Result<Vec<Detection>> {
        if !image.validate() {
            return Err(CounterError::detector(format!(
                "inconsistent {}x{} frame with {} bytes",
                image.width,
                image.height,
                image.data.len()
            )));
        }
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!("Stub detector in use - no actual detection performed");
        }
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "stub"
    }
}
