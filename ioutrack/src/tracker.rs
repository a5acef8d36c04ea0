//! SORT-style multi-object tracker owning the tracks of one stream

use crate::association::{associate, AssociationMethod};
use crate::bbox::Bbox;
use crate::kalman::NoiseConfig;
use crate::track::{Observation, Track, TrackSnapshot};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Frames a track may go unmatched before it is purged
    pub max_age: u32,
    /// Matched frames, creation included, before a track is emitted
    pub min_hits: u32,
    /// Minimum IoU between a detection and a predicted box to associate them
    pub iou_threshold: f32,
    pub association: AssociationMethod,
    pub noise: NoiseConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 10,
            min_hits: 1, // report from the first detection
            iou_threshold: 0.3,
            association: AssociationMethod::Greedy,
            noise: NoiseConfig::default(),
        }
    }
}

/// Track lifecycle manager. Ids start at 1 and are never reused by the same
/// instance, so independent trackers never share identities.
#[derive(Debug, Clone)]
pub struct MultiTracker {
    config: TrackerConfig,
    next_track_id: u32,
    tracks: BTreeMap<u32, Track>,
    n_steps: u64,
}

impl MultiTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            next_track_id: 1,
            tracks: BTreeMap::new(),
            n_steps: 0,
        }
    }

    /// Predict every track one frame ahead. Tracks whose prediction is no
    /// longer a usable box are dropped. Returned in ascending id order.
    fn predict_tracks(&mut self) -> Vec<(u32, Bbox)> {
        let mut predicted = Vec::with_capacity(self.tracks.len());
        self.tracks.retain(|&id, track| {
            let bbox = track.predict();
            if bbox.is_valid() {
                predicted.push((id, bbox));
                true
            } else {
                debug!("dropping track {id}: invalid prediction {bbox}");
                false
            }
        });
        predicted
    }

    fn spawn(&mut self, observation: &Observation) {
        let id = self.next_track_id;
        self.next_track_id += 1;
        debug!("new track {id} ({}) at {}", observation.class_label, observation.bbox);
        self.tracks.insert(id, Track::new(id, observation, &self.config.noise));
    }

    /// Run one frame: predict, associate, update, age, spawn, purge, emit.
    ///
    /// Returns the confirmed tracks that survive the frame, ascending id.
    pub fn step(&mut self, observations: &[Observation]) -> Result<Vec<TrackSnapshot>> {
        let observations: Vec<&Observation> = observations
            .iter()
            .filter(|o| o.bbox.is_valid())
            .collect();

        let predicted = self.predict_tracks();

        let det_boxes: Vec<Bbox> = observations.iter().map(|o| o.bbox).collect();
        let track_boxes: Vec<Bbox> = predicted.iter().map(|(_, b)| *b).collect();
        let association = associate(
            &det_boxes,
            &track_boxes,
            self.config.iou_threshold,
            self.config.association,
        );

        for &(det_idx, track_idx) in &association.matches {
            let id = predicted[track_idx].0;
            if let Some(track) = self.tracks.get_mut(&id) {
                track
                    .update(observations[det_idx])
                    .with_context(|| format!("updating track {id}"))?;
            }
        }

        for &track_idx in &association.unmatched_tracks {
            if let Some(track) = self.tracks.get_mut(&predicted[track_idx].0) {
                track.mark_missed();
            }
        }

        for &det_idx in &association.unmatched_detections {
            self.spawn(observations[det_idx]);
        }

        let max_age = self.config.max_age;
        self.tracks.retain(|id, track| {
            let keep = track.time_since_update <= max_age;
            if !keep {
                debug!("purging track {id} after {} missed frames", track.time_since_update);
            }
            keep
        });

        self.n_steps += 1;
        debug!(
            "frame {}: {} observations, {} matched, {} new, {} live tracks",
            self.n_steps,
            observations.len(),
            association.matches.len(),
            association.unmatched_detections.len(),
            self.tracks.len()
        );

        Ok(self.confirmed_tracks())
    }

    /// Confirmed tracks in ascending id order
    pub fn confirmed_tracks(&self) -> Vec<TrackSnapshot> {
        self.tracks
            .values()
            .filter(|t| t.is_confirmed(self.config.min_hits))
            .map(Track::snapshot)
            .collect()
    }

    /// Drop every track. The id counter keeps counting.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn frame_count(&self) -> u64 {
        self.n_steps
    }
}

impl Default for MultiTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn obs(x1: f32, y1: f32, x2: f32, y2: f32, label: &str) -> Observation {
        Observation::new(Bbox::new(x1, y1, x2, y2), label, 0.9)
    }

    fn hungarian() -> TrackerConfig {
        TrackerConfig {
            association: AssociationMethod::Hungarian,
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn test_first_frame_reports_immediately() {
        let mut tracker = MultiTracker::default();
        let out = tracker.step(&[obs(10.0, 10.0, 50.0, 50.0, "car")]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 1);
        assert_eq!(out[0].hits, 1);
        assert_abs_diff_eq!(out[0].bbox.xmin, 10.0, epsilon = 1e-3);
    }

    #[test]
    fn test_scenario_id_stability_and_deletion() {
        for config in [TrackerConfig::default(), hungarian()] {
            let mut tracker = MultiTracker::new(config);

            let f1 = tracker.step(&[obs(10.0, 10.0, 50.0, 50.0, "car")]).unwrap();
            assert_eq!(f1.len(), 1);
            let id = f1[0].id;

            let f2 = tracker.step(&[obs(12.0, 11.0, 52.0, 51.0, "car")]).unwrap();
            assert_eq!(f2.len(), 1);
            assert_eq!(f2[0].id, id);
            assert_eq!(f2[0].time_since_update, 0);

            // frames 3..=12: ten misses, still within max_age, predicted box reported
            for frame in 3..=12 {
                let out = tracker.step(&[]).unwrap();
                assert_eq!(out.len(), 1, "frame {frame}");
                assert_eq!(out[0].time_since_update, frame - 2);
            }

            // frame 13: eleventh miss exceeds max_age
            assert!(tracker.step(&[]).unwrap().is_empty());
            assert_eq!(tracker.num_tracks(), 0);

            // frame 14 and beyond: gone for good
            assert!(tracker.step(&[]).unwrap().is_empty());
        }
    }

    #[test]
    fn test_id_stable_over_many_frames() {
        let mut tracker = MultiTracker::default();
        let mut seen = Vec::new();
        for i in 0..30 {
            let dx = i as f32 * 2.0;
            let out = tracker
                .step(&[
                    obs(10.0 + dx, 10.0, 50.0 + dx, 50.0, "car"),
                    obs(300.0, 300.0 - dx, 360.0, 340.0 - dx, "bus"),
                ])
                .unwrap();
            assert_eq!(out.len(), 2);
            seen.push((out[0].id, out[1].id));
        }
        assert!(seen.iter().all(|&ids| ids == (1, 2)));
    }

    #[test]
    fn test_unmatched_detection_gets_fresh_id() {
        let mut tracker = MultiTracker::default();
        tracker.step(&[obs(10.0, 10.0, 50.0, 50.0, "car")]).unwrap();
        let out = tracker
            .step(&[
                obs(10.0, 10.0, 50.0, 50.0, "car"),
                obs(400.0, 400.0, 440.0, 440.0, "truck"),
            ])
            .unwrap();
        let ids: Vec<u32> = out.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(out[1].class_label, "truck");
    }

    #[test]
    fn test_ids_never_reused_after_deletion() {
        let config = TrackerConfig {
            max_age: 0,
            ..TrackerConfig::default()
        };
        let mut tracker = MultiTracker::new(config);
        tracker.step(&[obs(10.0, 10.0, 50.0, 50.0, "car")]).unwrap();
        assert!(tracker.step(&[]).unwrap().is_empty());

        let out = tracker.step(&[obs(10.0, 10.0, 50.0, 50.0, "car")]).unwrap();
        assert_eq!(out[0].id, 2);

        tracker.clear();
        let out = tracker.step(&[obs(10.0, 10.0, 50.0, 50.0, "car")]).unwrap();
        assert_eq!(out[0].id, 3);
    }

    #[test]
    fn test_min_hits_delays_confirmation() {
        let config = TrackerConfig {
            min_hits: 3,
            ..TrackerConfig::default()
        };
        let mut tracker = MultiTracker::new(config);
        let o = obs(10.0, 10.0, 50.0, 50.0, "car");
        assert!(tracker.step(&[o.clone()]).unwrap().is_empty());
        assert!(tracker.step(&[o.clone()]).unwrap().is_empty());
        let out = tracker.step(&[o]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hits, 3);
    }

    #[test]
    fn test_invalid_observations_are_ignored() {
        let mut tracker = MultiTracker::default();
        let out = tracker
            .step(&[
                obs(f32::INFINITY, 1.5, 12.6, 25.0, "car"),
                obs(20.0, 20.0, 10.0, 30.0, "car"),
            ])
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(tracker.num_tracks(), 0);
    }

    #[test]
    fn test_separate_trackers_have_independent_ids() {
        let mut a = MultiTracker::default();
        let mut b = MultiTracker::default();
        a.step(&[obs(0.0, 0.0, 10.0, 10.0, "car"), obs(50.0, 50.0, 60.0, 60.0, "car")])
            .unwrap();
        let out = b.step(&[obs(0.0, 0.0, 10.0, 10.0, "car")]).unwrap();
        assert_eq!(out[0].id, 1);
    }
}
