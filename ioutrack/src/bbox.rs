//! Bounding box operations and IoU calculations

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned box in corner form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Build from top-left corner and size
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f32 {
        (self.xmin + self.xmax) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.ymin + self.ymax) / 2.0
    }

    /// Finite coordinates and strictly positive extent
    pub fn is_valid(&self) -> bool {
        self.to_bounds().iter().all(|v| v.is_finite())
            && self.xmax > self.xmin
            && self.ymax > self.ymin
    }

    /// [xmin, ymin, xmax, ymax]
    pub fn to_bounds(&self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }

    /// Observation form [center_x, center_y, area, aspect_ratio]
    pub fn to_z(&self) -> [f32; 4] {
        let w = self.width();
        let h = self.height();
        let aspect_ratio = if h != 0.0 { w / h } else { 1.0 };
        [self.center_x(), self.center_y(), w * h, aspect_ratio]
    }

    /// Inverse of [`Bbox::to_z`]. A non-positive area or aspect ratio gives
    /// a box that fails [`Bbox::is_valid`].
    pub fn from_z(z: &[f32; 4]) -> Self {
        let [center_x, center_y, area, aspect_ratio] = *z;
        if area <= 0.0 || aspect_ratio <= 0.0 {
            return Self::new(f32::NAN, f32::NAN, f32::NAN, f32::NAN);
        }

        let h = (area / aspect_ratio).sqrt();
        let w = aspect_ratio * h;

        Self {
            xmin: center_x - w / 2.0,
            ymin: center_y - h / 2.0,
            xmax: center_x + w / 2.0,
            ymax: center_y + h / 2.0,
        }
    }
}

impl fmt::Display for Bbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bbox({:.1}, {:.1}, {:.1}, {:.1})",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

/// Intersection over union of two boxes
pub fn iou(a: &Bbox, b: &Bbox) -> f32 {
    let x1 = a.xmin.max(b.xmin);
    let y1 = a.ymin.max(b.ymin);
    let x2 = a.xmax.min(b.xmax);
    let y2 = a.ymax.min(b.ymax);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// IoU of every detection against every track, shape (n_detections, n_tracks)
pub fn iou_matrix(detections: &[Bbox], tracks: &[Bbox]) -> Array2<f32> {
    let n_dets = detections.len();
    let n_tracks = tracks.len();

    if n_dets == 0 || n_tracks == 0 {
        return Array2::zeros((n_dets, n_tracks));
    }

    let rows: Vec<f32> = detections
        .par_iter()
        .flat_map_iter(|det| tracks.iter().map(move |trk| iou(det, trk)))
        .collect();

    Array2::from_shape_fn((n_dets, n_tracks), |(i, j)| rows[i * n_tracks + j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bbox_properties() {
        let bbox = Bbox::new(0.0, 0.0, 10.0, 5.0);
        assert_eq!(bbox.width(), 10.0);
        assert_eq!(bbox.height(), 5.0);
        assert_eq!(bbox.area(), 50.0);
        assert_eq!(bbox.center_x(), 5.0);
        assert_eq!(bbox.center_y(), 2.5);
        assert_eq!(Bbox::from_xywh(1.0, 2.0, 3.0, 4.0), Bbox::new(1.0, 2.0, 4.0, 6.0));
    }

    #[test]
    fn test_iou_calculation() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
        let b = Bbox::new(5.0, 5.0, 15.0, 15.0);
        assert_abs_diff_eq!(iou(&a, &b), 25.0 / 175.0, epsilon = 0.001);
        assert_abs_diff_eq!(iou(&a, &a), 1.0, epsilon = 1e-6);

        let far = Bbox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(iou(&a, &far), 0.0);
    }

    #[test]
    fn test_z_conversion() {
        let bbox = Bbox::new(10.0, 10.0, 50.0, 30.0);
        let back = Bbox::from_z(&bbox.to_z());

        assert_abs_diff_eq!(bbox.xmin, back.xmin, epsilon = 0.001);
        assert_abs_diff_eq!(bbox.ymin, back.ymin, epsilon = 0.001);
        assert_abs_diff_eq!(bbox.xmax, back.xmax, epsilon = 0.001);
        assert_abs_diff_eq!(bbox.ymax, back.ymax, epsilon = 0.001);
    }

    #[test]
    fn test_degenerate_boxes_are_invalid() {
        assert!(!Bbox::new(5.0, 5.0, 5.0, 10.0).is_valid());
        assert!(!Bbox::new(f32::INFINITY, 0.0, 1.0, 1.0).is_valid());
        assert!(!Bbox::from_z(&[10.0, 10.0, -4.0, 1.0]).is_valid());
        assert!(Bbox::new(0.0, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_iou_matrix_shape() {
        let dets = [Bbox::new(0.0, 0.0, 10.0, 10.0), Bbox::new(100.0, 100.0, 110.0, 110.0)];
        let tracks = [Bbox::new(100.0, 100.0, 110.0, 110.0)];

        let m = iou_matrix(&dets, &tracks);
        assert_eq!(m.shape(), &[2, 1]);
        assert_eq!(m[(0, 0)], 0.0);
        assert_abs_diff_eq!(m[(1, 0)], 1.0, epsilon = 1e-6);

        assert_eq!(iou_matrix(&dets, &[]).shape(), &[2, 0]);
    }
}
