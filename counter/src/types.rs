//! Type definitions shared by the detector, the session and the wire format

use ioutrack::{Bbox, Observation};
use serde::{Deserialize, Serialize};

/// Single detector output for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box in pixel coordinates, corner form (x1, y1, x2, y2)
    pub bbox: Bbox,
    /// Raw detector label, e.g. COCO "motorcycle"
    pub class_label: String,
    /// Detection confidence score (0-1)
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: Bbox, class_label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_label: class_label.into(),
            confidence,
        }
    }

    pub fn to_observation(&self) -> Observation {
        Observation::new(self.bbox, self.class_label.clone(), self.confidence)
    }
}

/// Decoded RGB8 frame
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw pixel data, row-major RGB
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageData {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Decode an encoded image (JPEG, PNG, ...) into RGB8
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let img = image::load_from_memory(bytes)?.to_rgb8();
        let (width, height) = img.dimensions();
        Ok(Self {
            data: img.into_raw(),
            width,
            height,
        })
    }

    /// Validate image data consistency
    pub fn validate(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

/// One tracked vehicle in the outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedVehicle {
    /// "<class>_<track_id>", e.g. "car_3"
    pub id: String,
    pub class: String,
    pub confidence: f32,
    /// Top-left x
    pub x: f32,
    /// Top-left y
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Per-class counts of the vehicles visible in the current frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub cars: u32,
    pub trucks: u32,
    pub buses: u32,
    pub bikes: u32,
}

impl ClassCounts {
    pub fn total(&self) -> u32 {
        self.cars + self.trucks + self.buses + self.bikes
    }
}

/// Outbound JSON message for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub detections: Vec<TrackedVehicle>,
    pub stats: ClassCounts,
}
