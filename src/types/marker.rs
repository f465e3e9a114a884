use serde::{Deserialize, Serialize};

use super::geometry::{Quad, Rect};

/// A decoded marker in a frame (C2 output), pre-cooldown-filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerObservation {
    pub id: Option<i64>,
    pub bbox: Rect,
    pub corners: Option<Quad>,
    pub decoded_text: String,
    #[serde(skip)]
    pub seen_at: Option<std::time::Instant>,
}

impl MarkerObservation {
    pub fn unidentified(bbox: Rect, decoded_text: impl Into<String>) -> Self {
        Self {
            id: None,
            bbox,
            corners: None,
            decoded_text: decoded_text.into(),
            seen_at: Some(std::time::Instant::now()),
        }
    }
}
