//! Object Detector plugin (C3): run a trained model over a frame, draw
//! annotations, return a class-count summary. The inference itself is out
//! of scope — implementations plug in a concrete model backend.

use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;

use crate::types::frame::CameraNative;
use crate::types::{Detection, DetectionSummary, Frame, InferenceNative};

/// The trained-model inference itself — a plugin boundary. A backend with
/// no loaded model is a legal no-op.
pub trait ObjectInference: Send + Sync {
    fn infer(&self, frame: &Frame<InferenceNative>) -> Vec<Detection>;
}

pub struct NoModelLoaded;
impl ObjectInference for NoModelLoaded {
    fn infer(&self, _frame: &Frame<InferenceNative>) -> Vec<Detection> {
        Vec::new()
    }
}

/// Deterministic palette so the same class always draws in the same color
/// across frames.
fn color_for_class(class_id: i32) -> Rgb<u8> {
    const PALETTE: [[u8; 3]; 8] = [
        [230, 25, 75],
        [60, 180, 75],
        [255, 225, 25],
        [0, 130, 200],
        [245, 130, 48],
        [145, 30, 180],
        [70, 240, 240],
        [240, 50, 230],
    ];
    let idx = (class_id.unsigned_abs() as usize) % PALETTE.len();
    Rgb(PALETTE[idx])
}

pub struct ObjectDetector {
    inference: Box<dyn ObjectInference>,
    pub confidence_threshold: f32,
}

impl ObjectDetector {
    pub fn new(inference: Box<dyn ObjectInference>, confidence_threshold: f32) -> Self {
        Self {
            inference,
            confidence_threshold,
        }
    }

    pub fn no_op() -> Self {
        Self::new(Box::new(NoModelLoaded), 0.0)
    }

    /// Consumes camera-native, converts internally, returns camera-native.
    pub fn detect(&self, frame: &Frame<CameraNative>) -> (Frame<CameraNative>, DetectionSummary) {
        let inference_frame = frame.to_inference_native();
        let detections: Vec<Detection> = self
            .inference
            .infer(&inference_frame)
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect();

        if detections.is_empty() {
            return (frame.clone(), DetectionSummary::default());
        }

        let mut annotated = frame.to_rgb_image();
        for detection in &detections {
            let rect = imageproc::rect::Rect::at(detection.bbox.x, detection.bbox.y)
                .of_size(detection.bbox.w.max(1) as u32, detection.bbox.h.max(1) as u32);
            draw_hollow_rect_mut(&mut annotated, rect, color_for_class(detection.class_id));
        }

        let summary = DetectionSummary::from_detections(&detections);
        (Frame::from_rgb_image(&annotated, frame.seq), summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;

    struct FixedInference(Vec<Detection>);
    impl ObjectInference for FixedInference {
        fn infer(&self, _frame: &Frame<InferenceNative>) -> Vec<Detection> {
            self.0.clone()
        }
    }

    #[test]
    fn no_model_is_legal_noop() {
        let detector = ObjectDetector::no_op();
        let frame = Frame::<CameraNative>::new(4, 4, vec![0u8; 4 * 4 * 3], 0);
        let (out, summary) = detector.detect(&frame);
        assert_eq!(out.data, frame.data);
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn filters_below_confidence_threshold() {
        let detections = vec![
            Detection::new(1, "leaf", Rect::new(0, 0, 2, 2), 0.9),
            Detection::new(2, "fruit", Rect::new(1, 1, 2, 2), 0.2),
        ];
        let detector = ObjectDetector::new(Box::new(FixedInference(detections)), 0.5);
        let frame = Frame::<CameraNative>::new(4, 4, vec![0u8; 4 * 4 * 3], 0);
        let (_, summary) = detector.detect(&frame);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.counts.get("leaf"), Some(&1));
    }
}
