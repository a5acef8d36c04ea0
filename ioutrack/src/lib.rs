//! Pure Rust IoU-based multi-object tracking
//!
//! Boxes are predicted forward with a constant-velocity Kalman filter,
//! associated with the next frame's detections by IoU, and kept alive for a
//! bounded number of missed frames.
//!
//! ```rust,ignore
//! use ioutrack::{Bbox, MultiTracker, Observation, TrackerConfig};
//!
//! let mut tracker = MultiTracker::new(TrackerConfig::default());
//! let frame = [Observation::new(Bbox::new(10.0, 10.0, 50.0, 50.0), "car", 0.9)];
//! let tracks = tracker.step(&frame)?;
//! assert_eq!(tracks[0].id, 1);
//! ```

pub mod association;
pub mod bbox;
pub mod kalman;
pub mod track;
pub mod tracker;

pub use association::{associate, Association, AssociationMethod};
pub use bbox::{iou, iou_matrix, Bbox};
pub use kalman::{KalmanFilter, NoiseConfig};
pub use track::{Observation, Track, TrackSnapshot};
pub use tracker::{MultiTracker, TrackerConfig};
