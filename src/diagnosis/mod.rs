//! Diagnosis Workflow (C6): per-marker-ID three-stage pipeline (mask prompt
//! → mask → report), debounce, progress events.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use image::ImageOutputFormat;
use tracing::{error, info, warn};

use crate::error::{ErrorCategory, ErrorSeverity, SystemError};
use crate::segmentation::SegmentationService;
use crate::types::frame::CameraNative;
use crate::types::{CooldownEntry, DiagnosisReport, Frame};
use crate::vlm::{parse_report, strip_images, VlmAdapter, VlmConfig};

pub const DEFAULT_MASK_PROMPT: &str = "diseased region";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GeneratingMaskPrompt,
    GeneratingMask,
    GeneratingReport,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeneratingMaskPrompt => "generating_mask_prompt",
            Self::GeneratingMask => "generating_mask",
            Self::GeneratingReport => "generating_report",
        }
    }
}

/// Receives progress/lifecycle events from an in-flight or refused
/// diagnosis. Implemented by the control plane to fan events out to
/// clients.
pub trait DiagnosisEventSink: Send + Sync {
    fn on_progress(&self, plant_id: i64, stage: Stage, message: &str, percent: u8);
    fn on_cooldown(&self, plant_id: i64, remaining: Duration);
    fn on_error(&self, plant_id: i64, error: &SystemError);
    fn on_complete(&self, report: &DiagnosisReport);
}

pub struct NoOpSink;
impl DiagnosisEventSink for NoOpSink {
    fn on_progress(&self, _plant_id: i64, _stage: Stage, _message: &str, _percent: u8) {}
    fn on_cooldown(&self, _plant_id: i64, _remaining: Duration) {}
    fn on_error(&self, _plant_id: i64, _error: &SystemError) {}
    fn on_complete(&self, _report: &DiagnosisReport) {}
}

pub struct DiagnosisWorkflow {
    vlm: VlmAdapter,
    segmentation: SegmentationService,
    ai_config: ArcSwapOption<VlmConfig>,
    cooldowns: Mutex<HashMap<i64, CooldownEntry>>,
    cooldown_duration: Duration,
    history: Mutex<VecDeque<DiagnosisReport>>,
    history_capacity: usize,
    enabled: AtomicBool,
}

impl DiagnosisWorkflow {
    pub fn new(vlm: VlmAdapter, segmentation: SegmentationService, cfg: &crate::config::DiagnosisConfig) -> Self {
        Self {
            vlm,
            segmentation,
            ai_config: ArcSwapOption::empty(),
            cooldowns: Mutex::new(HashMap::new()),
            cooldown_duration: Duration::from_secs(cfg.cooldown_secs),
            history: Mutex::new(VecDeque::with_capacity(cfg.history_capacity)),
            history_capacity: cfg.history_capacity,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_ai_config(&self, config: VlmConfig) {
        self.ai_config.store(Some(std::sync::Arc::new(config)));
    }

    pub fn ai_config_snapshot(&self) -> Option<std::sync::Arc<VlmConfig>> {
        self.ai_config.load_full()
    }

    /// True iff diagnosis is enabled AND the plant's cooldown has expired
    /// AND a vision-capable AI configuration exists.
    pub fn should_trigger(&self, plant_id: i64) -> bool {
        if !self.enabled.load(Ordering::SeqCst) {
            return false;
        }
        let Some(config) = self.ai_config.load_full() else {
            return false;
        };
        if !config.supports_vision {
            return false;
        }
        let cooldowns = self.cooldowns.lock().unwrap_or_else(|e| e.into_inner());
        !cooldowns.get(&plant_id).is_some_and(|c| !c.is_expired())
    }

    pub fn cooldown_remaining(&self, plant_id: i64) -> Duration {
        self.cooldowns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&plant_id)
            .map(CooldownEntry::remaining)
            .unwrap_or_default()
    }

    pub fn history(&self, limit: Option<usize>) -> Vec<DiagnosisReport> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        match limit {
            Some(n) => history.iter().rev().take(n).cloned().collect::<Vec<_>>().into_iter().rev().collect(),
            None => history.iter().cloned().collect(),
        }
    }

    /// Run the three-stage pipeline. Returns `None` on a terminal stage-3
    /// failure (already reported to `sink`); stages 1-2 are best-effort and
    /// never abort the diagnosis.
    pub async fn execute(
        &self,
        plant_id: i64,
        frame: &Frame<CameraNative>,
        sink: &dyn DiagnosisEventSink,
    ) -> Option<DiagnosisReport> {
        let started = Instant::now();
        let Some(config) = self.ai_config.load_full() else {
            sink.on_error(
                plant_id,
                &SystemError::new(4001, ErrorCategory::AiConfig, ErrorSeverity::Medium, "no AI configuration set"),
            );
            return None;
        };

        let inference_image = frame.to_inference_native().to_rgb_image();
        let client_image = frame.to_client_native().to_rgb_image();

        // Stage 1 — mask prompt synthesis (0 -> 33%).
        sink.on_progress(plant_id, Stage::GeneratingMaskPrompt, "synthesizing mask prompt", 0);
        let mask_prompt = match self.vlm.generate_mask_prompt(&config, &inference_image).await {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(plant_id, error = %e, "mask prompt synthesis failed, using default");
                DEFAULT_MASK_PROMPT.to_string()
            }
        };
        sink.on_progress(plant_id, Stage::GeneratingMaskPrompt, "mask prompt ready", 33);

        // Stage 2 — mask generation (33 -> 66%), optional.
        sink.on_progress(plant_id, Stage::GeneratingMask, "generating mask", 33);
        let segmentation_result = self
            .segmentation
            .segment(&inference_image, &mask_prompt, crate::config::defaults::SEGMENTATION_DEFAULT_SAMPLE_FRAMES)
            .await;
        let (mask_image, mask_description) = if segmentation_result.success {
            (Some(segmentation_result.mask_base64), Some(segmentation_result.description))
        } else {
            warn!(plant_id, "mask generation failed, proceeding without a mask");
            (None, None)
        };
        sink.on_progress(plant_id, Stage::GeneratingMask, "mask stage complete", 66);

        // Stage 3 — report synthesis (66 -> 100%). Terminal on failure.
        sink.on_progress(plant_id, Stage::GeneratingReport, "synthesizing report", 66);
        let markdown = match self
            .vlm
            .diagnose(&config, plant_id, &inference_image, mask_image.as_deref(), mask_description.as_deref(), Some(&mask_prompt))
            .await
        {
            Ok(markdown) => markdown,
            Err(e) => {
                error!(plant_id, error = %e, "report synthesis failed");
                sink.on_error(
                    plant_id,
                    &SystemError::new(4002, ErrorCategory::AiConfig, ErrorSeverity::High, e.to_string())
                        .with_context("plant_id", plant_id.to_string()),
                );
                return None;
            }
        };

        let cleaned = strip_images(&markdown);
        let parsed = parse_report(&cleaned);

        let mut buf = Vec::new();
        let _ = client_image.write_to(&mut std::io::Cursor::new(&mut buf), ImageOutputFormat::Jpeg(80));
        let original_image = format!("data:image/jpeg;base64,{}", BASE64.encode(buf));

        let report = DiagnosisReport {
            report_id: format!("diag-{plant_id}-{}", Utc::now().timestamp_millis()),
            plant_id,
            captured_at: Utc::now(),
            original_image,
            mask_image,
            mask_prompt: Some(mask_prompt),
            markdown_report: cleaned,
            summary: parsed.summary,
            severity: parsed.severity,
            diseases: parsed.diseases,
            recommendations: parsed.recommendations,
            model_label: config.model.clone(),
            confidence: parsed.confidence,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        };

        sink.on_progress(plant_id, Stage::GeneratingReport, "report ready", 100);

        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() >= self.history_capacity {
                history.pop_front();
            }
            history.push_back(report.clone());
        }
        {
            let mut cooldowns = self.cooldowns.lock().unwrap_or_else(|e| e.into_inner());
            cooldowns.insert(plant_id, CooldownEntry::starting_now(self.cooldown_duration));
        }

        info!(plant_id, report_id = %report.report_id, "diagnosis complete");
        sink.on_complete(&report);
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_trigger_false_without_config() {
        let workflow = DiagnosisWorkflow::new(
            VlmAdapter::new(reqwest::Client::new()),
            SegmentationService::new(&crate::config::SegmentationConfig::default()),
            &crate::config::DiagnosisConfig::default(),
        );
        workflow.set_enabled(true);
        assert!(!workflow.should_trigger(42));
    }
}
