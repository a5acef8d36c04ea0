//! Vehicle class vocabulary and per-frame counting

use crate::types::{ClassCounts, FrameReport, TrackedVehicle};
use ioutrack::TrackSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classes reported to clients. Anything else the detector sees is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Truck,
    Bus,
    Motorbike,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [Self::Car, Self::Truck, Self::Bus, Self::Motorbike];

    /// Map a raw detector label; `motorcycle` is reported as `motorbike`
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "car" => Some(Self::Car),
            "truck" => Some(Self::Truck),
            "bus" => Some(Self::Bus),
            "motorcycle" => Some(Self::Motorbike),
            _ => None,
        }
    }

    /// External class name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Truck => "truck",
            Self::Bus => "bus",
            Self::Motorbike => "motorbike",
        }
    }

    /// Key under `stats`
    pub fn count_key(&self) -> &'static str {
        match self {
            Self::Car => "cars",
            Self::Truck => "trucks",
            Self::Bus => "buses",
            Self::Motorbike => "bikes",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClassCounts {
    pub fn increment(&mut self, class: VehicleClass) {
        match class {
            VehicleClass::Car => self.cars += 1,
            VehicleClass::Truck => self.trucks += 1,
            VehicleClass::Bus => self.buses += 1,
            VehicleClass::Motorbike => self.bikes += 1,
        }
    }

    pub fn get(&self, class: VehicleClass) -> u32 {
        match class {
            VehicleClass::Car => self.cars,
            VehicleClass::Truck => self.trucks,
            VehicleClass::Bus => self.buses,
            VehicleClass::Motorbike => self.bikes,
        }
    }
}

/// Build the outbound report from this frame's confirmed tracks. Counts are
/// recomputed from scratch every call.
pub fn aggregate(tracks: &[TrackSnapshot]) -> FrameReport {
    let mut report = FrameReport::default();

    for track in tracks {
        let Some(class) = VehicleClass::from_label(&track.class_label) else {
            continue;
        };

        report.stats.increment(class);
        report.detections.push(TrackedVehicle {
            id: format!("{}_{}", class, track.id),
            class: class.as_str().to_string(),
            confidence: track.confidence,
            x: track.bbox.xmin,
            y: track.bbox.ymin,
            w: track.bbox.width(),
            h: track.bbox.height(),
        });
    }

    report
}
