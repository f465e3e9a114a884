use serde::{Deserialize, Serialize};

use super::geometry::Rect;

/// A single bounding-box detection (C3 output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: i32,
    pub class_name: String,
    pub bbox: Rect,
    pub confidence: f32,
}

impl Detection {
    pub fn new(class_id: i32, class_name: impl Into<String>, bbox: Rect, confidence: f32) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// `{class_name -> count}` plus a total, emitted periodically by the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub counts: std::collections::BTreeMap<String, u32>,
    pub total: u32,
}

impl DetectionSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut counts = std::collections::BTreeMap::new();
        for d in detections {
            *counts.entry(d.class_name.clone()).or_insert(0) += 1;
        }
        Self {
            total: detections.len() as u32,
            counts,
        }
    }
}
