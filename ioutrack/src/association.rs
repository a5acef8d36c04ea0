//! Detection-to-track association over an IoU matrix
//!
//! Two policies are available. [`AssociationMethod::Greedy`] walks the
//! detections in input order and lets each claim its best free track.
//! [`AssociationMethod::Hungarian`] solves the assignment that maximises the
//! total IoU, which behaves better when boxes crowd each other.
use crate::bbox::{iou_matrix, Bbox};
use ndarray::ArrayView2;
use pathfinding::prelude::{kuhn_munkres, Matrix};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point scale used to feed IoU into the integer assignment solver
const WEIGHT_SCALE: f32 = 1_000_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationMethod {
    #[default]
    Greedy,
    Hungarian,
}

impl fmt::Display for AssociationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Greedy => write!(f, "greedy"),
            Self::Hungarian => write!(f, "hungarian"),
        }
    }
}

/// Outcome of one association pass. Indices refer to the input slices and
/// every list is sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Association {
    /// (detection_idx, track_idx) pairs
    pub matches: Vec<(usize, usize)>,
    pub unmatched_detections: Vec<usize>,
    pub unmatched_tracks: Vec<usize>,
}

impl Association {
    fn from_matches(mut matches: Vec<(usize, usize)>, n_dets: usize, n_tracks: usize) -> Self {
        matches.sort_unstable();

        let mut det_used = vec![false; n_dets];
        let mut track_used = vec![false; n_tracks];
        for &(d, t) in &matches {
            det_used[d] = true;
            track_used[t] = true;
        }

        Self {
            matches,
            unmatched_detections: (0..n_dets).filter(|&d| !det_used[d]).collect(),
            unmatched_tracks: (0..n_tracks).filter(|&t| !track_used[t]).collect(),
        }
    }
}

/// Match `detections` against predicted `tracks`. A pair qualifies when its
/// IoU is positive and at least `iou_threshold`.
pub fn associate(
    detections: &[Bbox],
    tracks: &[Bbox],
    iou_threshold: f32,
    method: AssociationMethod,
) -> Association {
    let ious = iou_matrix(detections, tracks);
    match method {
        AssociationMethod::Greedy => solve_greedy(ious.view(), iou_threshold),
        AssociationMethod::Hungarian => solve_hungarian(ious.view(), iou_threshold),
    }
}

fn qualifies(iou: f32, iou_threshold: f32) -> bool {
    iou > 0.0 && iou >= iou_threshold
}

/// Each detection, in order, takes the unclaimed track with the highest IoU.
/// Equal IoU keeps the earlier track.
fn solve_greedy(ious: ArrayView2<f32>, iou_threshold: f32) -> Association {
    let (n_dets, n_tracks) = ious.dim();
    let mut claimed = vec![false; n_tracks];
    let mut matches = Vec::new();

    for d in 0..n_dets {
        let mut best: Option<(usize, f32)> = None;
        for t in 0..n_tracks {
            let iou = ious[(d, t)];
            if claimed[t] || !qualifies(iou, iou_threshold) {
                continue;
            }
            if best.map_or(true, |(_, best_iou)| iou > best_iou) {
                best = Some((t, iou));
            }
        }

        if let Some((t, _)) = best {
            claimed[t] = true;
            matches.push((d, t));
        }
    }

    Association::from_matches(matches, n_dets, n_tracks)
}

/// Maximum total IoU assignment (Kuhn-Munkres) over a padded square matrix
fn solve_hungarian(ious: ArrayView2<f32>, iou_threshold: f32) -> Association {
    let (n_dets, n_tracks) = ious.dim();
    if n_dets == 0 || n_tracks == 0 {
        return Association::from_matches(Vec::new(), n_dets, n_tracks);
    }

    let size = n_dets.max(n_tracks);
    let mut weights = Matrix::new(size, size, 0i64);
    for ((d, t), &iou) in ious.indexed_iter() {
        if qualifies(iou, iou_threshold) {
            weights[(d, t)] = (iou * WEIGHT_SCALE) as i64;
        }
    }

    let (_total, assignment) = kuhn_munkres(&weights);

    let matches = assignment
        .into_iter()
        .enumerate()
        .filter(|&(d, t)| d < n_dets && t < n_tracks && qualifies(ious[(d, t)], iou_threshold))
        .collect();

    Association::from_matches(matches, n_dets, n_tracks)
}
