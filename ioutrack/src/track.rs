//! Single tracked object: identity, lifecycle counters and Kalman state

use crate::bbox::Bbox;
use crate::kalman::{KalmanFilter, NoiseConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One detection fed to the tracker for the current frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub bbox: Bbox,
    pub class_label: String,
    pub confidence: f32,
}

impl Observation {
    pub fn new(bbox: Bbox, class_label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_label: class_label.into(),
            confidence,
        }
    }
}

/// Read-only view of a track as emitted for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub id: u32,
    pub bbox: Bbox,
    pub class_label: String,
    pub confidence: f32,
    pub age: u32,
    pub hits: u32,
    pub time_since_update: u32,
}

#[derive(Debug, Clone)]
pub struct Track {
    /// track id, unique within the owning tracker
    pub id: u32,
    /// last observed class label
    pub class_label: String,
    /// confidence of the last matched observation
    pub confidence: f32,
    /// number of predict() calls since creation
    pub age: u32,
    /// number of frames with a matched observation, creation included
    pub hits: u32,
    /// consecutive frames with a matched observation
    pub hit_streak: u32,
    /// frames since the last matched observation
    pub time_since_update: u32,
    kf: KalmanFilter,
}

impl Track {
    /// New track seeded from an unmatched observation
    pub fn new(id: u32, observation: &Observation, noise: &NoiseConfig) -> Self {
        Self {
            id,
            class_label: observation.class_label.clone(),
            confidence: observation.confidence,
            age: 0,
            hits: 1,
            hit_streak: 1,
            time_since_update: 0,
            kf: KalmanFilter::constant_velocity(observation.bbox.to_z(), noise),
        }
    }

    /// Advance the state one frame and return the predicted box.
    /// Call once per frame, before association.
    pub fn predict(&mut self) -> Bbox {
        self.kf.predict();
        self.age += 1;
        self.bbox()
    }

    /// Correct the state with the observation matched this frame
    pub fn update(&mut self, observation: &Observation) -> Result<()> {
        self.kf.update(observation.bbox.to_z())?;
        self.hits += 1;
        self.hit_streak += 1;
        self.time_since_update = 0;
        self.class_label.clone_from(&observation.class_label);
        self.confidence = observation.confidence;
        Ok(())
    }

    /// No observation matched this frame
    pub fn mark_missed(&mut self) {
        self.time_since_update += 1;
        self.hit_streak = 0;
    }

    /// Current box from the filter state
    pub fn bbox(&self) -> Bbox {
        Bbox::from_z(&self.kf.observed_state())
    }

    pub fn is_confirmed(&self, min_hits: u32) -> bool {
        self.hits >= min_hits
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            bbox: self.bbox(),
            class_label: self.class_label.clone(),
            confidence: self.confidence,
            age: self.age,
            hits: self.hits,
            time_since_update: self.time_since_update,
        }
    }
}
