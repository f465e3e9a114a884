//! Outbound events the frame pipeline (C7) raises. The control plane (C9)
//! implements this to fan events out over the client channel; tests
//! implement it to assert on emitted events without a live socket.

use crate::types::frame::ClientNative;
use crate::types::{DetectionSummary, Frame, MarkerObservation};

pub trait PipelineEventSink: Send + Sync {
    /// A confirmed (non-cooldown, non-invalid) marker observation.
    fn on_marker_seen(&self, observation: &MarkerObservation);
    /// A repeat observation of a plant id still in its diagnosis cooldown.
    fn on_diagnosis_cooldown(&self, plant_id: i64, remaining_secs: f64);
    /// Periodic object-detection class-count summary.
    fn on_object_summary(&self, summary: &DetectionSummary);
    /// The client-native, JPEG-ready annotated frame for this iteration.
    fn on_frame(&self, frame: &Frame<ClientNative>, seq: u64, jpeg_quality: u8);
}

pub struct NoOpPipelineSink;
impl PipelineEventSink for NoOpPipelineSink {
    fn on_marker_seen(&self, _observation: &MarkerObservation) {}
    fn on_diagnosis_cooldown(&self, _plant_id: i64, _remaining_secs: f64) {}
    fn on_object_summary(&self, _summary: &DetectionSummary) {}
    fn on_frame(&self, _frame: &Frame<ClientNative>, _seq: u64, _jpeg_quality: u8) {}
}
