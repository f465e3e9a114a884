//! Frame Pipeline (C7): the governed producer loop that turns raw camera
//! frames into annotated, client-ready ones. Detector order is fixed
//! (object detector, then marker detector) and each detector's failure is
//! isolated — a panicking plugin is logged and skipped, never allowed to
//! take the loop down.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::detectors::marker::{DetectOptions, MarkerDetector};
use crate::detectors::object::ObjectDetector;
use crate::diagnosis::{DiagnosisEventSink, DiagnosisWorkflow};
use crate::driver::DroneHandle;
use crate::types::detection::DetectionSummary;
use crate::types::frame::CameraNative;
use crate::types::Frame;

use super::events::PipelineEventSink;
use super::source::FrameSource;

pub struct FramePipeline {
    handle: Arc<DroneHandle>,
    object_detector: ObjectDetector,
    marker_detector: MarkerDetector,
    diagnosis: Arc<DiagnosisWorkflow>,
    pipeline_sink: Arc<dyn PipelineEventSink>,
    diagnosis_sink: Arc<dyn DiagnosisEventSink>,
    marker_opts: DetectOptions,
    summary_interval: Duration,
    jpeg_quality: u8,
    target_fps: u32,
    /// Plant ids with a diagnosis job currently running, beyond the
    /// per-plant cooldown `DiagnosisWorkflow` itself enforces. The cooldown
    /// is only recorded once a job *finishes*, so without this guard a
    /// second marker observation arriving mid-job (stage 1/2 can take
    /// seconds) would pass `should_trigger` again and double-spawn.
    in_flight: Mutex<HashSet<i64>>,
    object_enabled: AtomicBool,
    marker_enabled: AtomicBool,
    video_enabled: AtomicBool,
}

impl FramePipeline {
    pub fn new(
        handle: Arc<DroneHandle>,
        object_detector: ObjectDetector,
        marker_detector: MarkerDetector,
        diagnosis: Arc<DiagnosisWorkflow>,
        pipeline_sink: Arc<dyn PipelineEventSink>,
        diagnosis_sink: Arc<dyn DiagnosisEventSink>,
        cfg: &PipelineConfig,
    ) -> Self {
        Self {
            handle,
            object_detector,
            marker_detector,
            diagnosis,
            pipeline_sink,
            diagnosis_sink,
            marker_opts: DetectOptions::default(),
            summary_interval: Duration::from_secs(cfg.summary_interval_secs),
            jpeg_quality: cfg.jpeg_quality,
            target_fps: cfg.target_fps.max(1),
            in_flight: Mutex::new(HashSet::new()),
            object_enabled: AtomicBool::new(false),
            marker_enabled: AtomicBool::new(false),
            video_enabled: AtomicBool::new(false),
        }
    }

    pub fn set_object_detection_enabled(&self, enabled: bool) {
        self.object_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_marker_detection_enabled(&self, enabled: bool) {
        self.marker_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Gates `video_frame` publication independent of detector state — a
    /// client can watch raw video without either detector running, or run
    /// detectors headless without paying JPEG-encode cost.
    pub fn set_video_enabled(&self, enabled: bool) {
        self.video_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::SeqCst)
    }

    pub fn set_marker_cooldown(&self, duration: Duration) {
        self.marker_detector.set_cooldown(duration);
    }

    pub fn marker_cooldown_seconds(&self) -> u64 {
        self.marker_detector.cooldown_seconds()
    }

    pub fn clear_marker_cooldowns(&self) {
        self.marker_detector.clear_cooldowns();
    }

    pub fn active_marker_cooldowns(&self) -> Vec<i64> {
        self.marker_detector.active_cooldowns()
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let frame_read = match self.handle.driver().get_frame_read().await {
            Ok(read) => read,
            Err(e) => {
                error!(error = %e, "frame pipeline could not acquire a frame reader, exiting");
                return;
            }
        };
        let mut source = FrameSource::new(frame_read);
        let period = Duration::from_secs_f64(1.0 / f64::from(self.target_fps));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_summary = Instant::now();

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("frame pipeline stopping");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let Some(frame) = source.next_frame().await else {
                continue;
            };

            let (object_frame, summary) = if self.object_enabled.load(Ordering::SeqCst) {
                run_object_detector(&self.object_detector, &frame)
            } else {
                (frame.clone(), DetectionSummary::default())
            };
            let (annotated, observations) = if self.marker_enabled.load(Ordering::SeqCst) {
                run_marker_detector(&self.marker_detector, &object_frame, &self.marker_opts)
            } else {
                (object_frame.clone(), Vec::new())
            };

            for observation in &observations {
                self.pipeline_sink.on_marker_seen(observation);
                if let Some(plant_id) = observation.id {
                    self.maybe_trigger_diagnosis(plant_id, &frame);
                }
            }

            if last_summary.elapsed() >= self.summary_interval {
                self.pipeline_sink.on_object_summary(&summary);
                last_summary = Instant::now();
            }

            if self.video_enabled.load(Ordering::SeqCst) {
                let client_frame = annotated.to_client_native();
                let seq = client_frame.seq;
                self.pipeline_sink.on_frame(&client_frame, seq, self.jpeg_quality);
            }
        }
    }

    fn maybe_trigger_diagnosis(self: &Arc<Self>, plant_id: i64, frame: &Frame<CameraNative>) {
        if !self.diagnosis.should_trigger(plant_id) {
            let remaining = self.diagnosis.cooldown_remaining(plant_id);
            if remaining > Duration::ZERO {
                self.pipeline_sink.on_diagnosis_cooldown(plant_id, remaining.as_secs_f64());
            }
            return;
        }

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(plant_id) {
                // Already running for this plant id; the trailing cooldown
                // window hasn't opened yet, but a job is already in flight.
                return;
            }
        }

        let pipeline = Arc::clone(self);
        let frame = frame.clone();
        tokio::spawn(async move {
            pipeline.diagnosis.execute(plant_id, &frame, pipeline.diagnosis_sink.as_ref()).await;
            pipeline.in_flight.lock().unwrap_or_else(|e| e.into_inner()).remove(&plant_id);
        });
    }
}

fn run_object_detector(detector: &ObjectDetector, frame: &Frame<CameraNative>) -> (Frame<CameraNative>, DetectionSummary) {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| detector.detect(frame))) {
        Ok(result) => result,
        Err(_) => {
            warn!("object detector panicked, skipping this frame's detections");
            (frame.clone(), DetectionSummary::default())
        }
    }
}

fn run_marker_detector(
    detector: &MarkerDetector,
    frame: &Frame<CameraNative>,
    opts: &DetectOptions,
) -> (Frame<CameraNative>, Vec<crate::types::MarkerObservation>) {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| detector.detect(frame, opts))) {
        Ok(result) => result,
        Err(_) => {
            warn!("marker detector panicked, skipping this frame's markers");
            (frame.clone(), Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::NoOpSink;
    use crate::driver::SimDriver;
    use crate::pipeline::events::NoOpPipelineSink;
    use crate::segmentation::SegmentationService;
    use crate::vlm::VlmAdapter;

    fn pipeline() -> Arc<FramePipeline> {
        let driver = Arc::new(SimDriver::default());
        driver.set_frame(Frame::<CameraNative>::new(16, 16, vec![0u8; 16 * 16 * 3], 0));
        let handle = Arc::new(DroneHandle::new(driver));
        let diagnosis = Arc::new(DiagnosisWorkflow::new(
            VlmAdapter::new(reqwest::Client::new()),
            SegmentationService::new(&crate::config::SegmentationConfig::default()),
            &crate::config::DiagnosisConfig::default(),
        ));
        Arc::new(FramePipeline::new(
            handle,
            ObjectDetector::no_op(),
            MarkerDetector::new(Arc::new(crate::detectors::marker::NoOpMarkerDecoder), Duration::from_secs(60)),
            diagnosis,
            Arc::new(NoOpPipelineSink),
            Arc::new(NoOpSink),
            &PipelineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn stops_promptly_on_cancellation() {
        let pipeline = pipeline();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(pipeline.run(token));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pipeline did not stop within the join timeout")
            .expect("pipeline task panicked");
    }

    #[test]
    fn in_flight_guard_blocks_duplicate_trigger_without_a_cooldown_entry() {
        let pipeline = pipeline();
        pipeline.diagnosis.set_enabled(true);
        // No AI config set, so `should_trigger` is false and the in-flight
        // set is never touched; this just pins the guard's default state.
        assert!(pipeline.in_flight.lock().unwrap().is_empty());
    }
}
