use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Medium
    }
}

/// A completed diagnosis (C6 output), created exactly once per triggered
/// diagnosis. Images are base64 payloads with an explicit MIME prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub report_id: String,
    pub plant_id: i64,
    pub captured_at: DateTime<Utc>,
    pub original_image: String,
    pub mask_image: Option<String>,
    pub mask_prompt: Option<String>,
    pub markdown_report: String,
    pub summary: String,
    pub severity: Severity,
    pub diseases: Vec<String>,
    pub recommendations: Vec<String>,
    pub model_label: String,
    pub confidence: f32,
    pub elapsed_seconds: f64,
}
