//! YOLOv8 / YOLO11 detector using ONNX Runtime
//!
//! Expects a COCO export with output shape `[1, 4 + 80, N]`: box center,
//! size, then one score per class.

use crate::detector::{Detector, DetectorConfig};
use crate::error::{CounterError, Result};
use crate::types::{Detection, ImageData};
use image::imageops::FilterType;
use image::RgbImage;
use ioutrack::{iou, Bbox};
use log::{debug, info};
use ndarray::{Array, ArrayView, IxDyn};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::Mutex;

const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub struct YoloDetector {
    session: Mutex<Session>,
    config: DetectorConfig,
}

impl YoloDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        info!("Loading YOLO model from {}", config.model_path);

        let session = Session::builder()
            .map_err(|e| CounterError::model_load(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| CounterError::model_load(e.to_string()))?
            .commit_from_file(&config.model_path)
            .map_err(|e| {
                CounterError::model_load(format!("Failed to load {}: {}", config.model_path, e))
            })?;

        info!("✓ Model loaded with CPU execution provider");
        Ok(Self {
            session: Mutex::new(session),
            config: config.clone(),
        })
    }

    /// Resize to the model input, scale to [0, 1], CHW layout [1, 3, S, S]
    fn preprocess(&self, image: &ImageData) -> Result<Array<f32, IxDyn>> {
        let size = self.config.input_size;
        let rgb = RgbImage::from_raw(image.width, image.height, image.data.clone())
            .ok_or_else(|| CounterError::detector("frame buffer does not match its size"))?;
        let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

        let s = size as usize;
        let mut input = Array::zeros((1, 3, s, s));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }
        Ok(input.into_dyn())
    }

    /// Decode raw predictions into pixel-space detections and apply NMS
    fn postprocess(
        &self,
        output: ArrayView<f32, IxDyn>,
        orig_w: u32,
        orig_h: u32,
    ) -> Result<Vec<Detection>> {
        let shape = output.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(CounterError::detector(format!(
                "Unexpected output shape: {:?}",
                shape
            )));
        }

        let num_classes = (shape[1] - 4).min(COCO_CLASSES.len());
        let num_boxes = shape[2];
        let scale_x = orig_w as f32 / self.config.input_size as f32;
        let scale_y = orig_h as f32 / self.config.input_size as f32;

        let mut candidates = Vec::new();
        for i in 0..num_boxes {
            let (class_id, confidence) = (0..num_classes)
                .map(|c| (c, output[[0, 4 + c, i]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if confidence < self.config.confidence_threshold {
                continue;
            }

            let cx = output[[0, 0, i]] * scale_x;
            let cy = output[[0, 1, i]] * scale_y;
            let w = output[[0, 2, i]] * scale_x;
            let h = output[[0, 3, i]] * scale_y;

            let bbox = Bbox::new(
                (cx - w / 2.0).max(0.0),
                (cy - h / 2.0).max(0.0),
                (cx + w / 2.0).min(orig_w as f32),
                (cy + h / 2.0).min(orig_h as f32),
            );
            candidates.push(Detection::new(bbox, COCO_CLASSES[class_id], confidence));
        }

        Ok(non_max_suppression(candidates, self.config.iou_threshold))
    }
}

/// Greedy per-class NMS, highest confidence first
fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = keep
            .iter()
            .any(|k| k.class_label == det.class_label && iou(&k.bbox, &det.bbox) >= iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

impl Detector for YoloDetector {
    fn detect(&self, image: &ImageData) -> Result<Vec<Detection>> {
        debug!("Starting detection on {}x{} image", image.width, image.height);

        let input_tensor = self.preprocess(image)?;
        let tensor_ref = TensorRef::from_array_view(&input_tensor)
            .map_err(|e| CounterError::detector(e.to_string()))?;

        let output_array = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| CounterError::detector("model session poisoned"))?;
            let outputs = session
                .run(ort::inputs![tensor_ref])
                .map_err(|e| CounterError::detector(e.to_string()))?;
            let array = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| CounterError::detector(e.to_string()))?
                .into_owned();
            array
        };

        let detections = self.postprocess(output_array.view(), image.width, image.height)?;
        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }

    fn name(&self) -> &str {
        "yolo-onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_keeps_best_per_class() {
        let dets = vec![
            Detection::new(Bbox::new(0.0, 0.0, 10.0, 10.0), "car", 0.6),
            Detection::new(Bbox::new(1.0, 0.0, 11.0, 10.0), "car", 0.9),
            Detection::new(Bbox::new(1.0, 0.0, 11.0, 10.0), "truck", 0.5),
            Detection::new(Bbox::new(50.0, 50.0, 60.0, 60.0), "car", 0.4),
        ];
        let kept = non_max_suppression(dets, 0.45);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert!(kept.iter().any(|d| d.class_label == "truck"));
    }
}
