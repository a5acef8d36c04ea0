//! Vehicle counting over websockets
//!
//! Each websocket connection gets its own [`Session`]: frames are decoded,
//! run through a shared [`Detector`], tracked with [`ioutrack`] and reduced to
//! per-class vehicle counts.

pub mod aggregator;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod server;
pub mod session;
pub mod types;

#[cfg(feature = "onnx")]
pub mod yolo;

pub use aggregator::{aggregate, VehicleClass};
pub use config::{ServerConfig, SessionConfig};
pub use detector::{Detector, DetectorConfig, DetectorKind, StubDetector};
pub use error::{CounterError, Result};
pub use frame::FrameEncoding;
pub use server::{router, serve, AppState};
pub use session::{FrameOutcome, Inbound, Session};
pub use types::{ClassCounts, Detection, FrameReport, ImageData, TrackedVehicle};

#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
