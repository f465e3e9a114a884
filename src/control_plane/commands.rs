//! Command dispatch (§4.9): wires every inbound [`ClientCommand`] to the
//! component it targets and turns the result back into [`ServerEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::diagnosis::{DiagnosisEventSink, DiagnosisWorkflow, NoOpSink, Stage};
use crate::driver::DroneHandle;
use crate::error::SystemError;
use crate::mission::{MissionController, MissionEventSink, PositionUpdate};
use crate::pipeline::{FramePipeline, PipelineEventSink};
use crate::status_cache::StatusCache;
use crate::types::drone_status::Position;
use crate::types::frame::ClientNative;
use crate::types::{DetectionSummary, DroneStatus, Frame, MarkerObservation, MissionPhase};
use crate::vlm::{Provider, VlmConfig};

use super::protocol::{ClientCommand, ServerEvent};
use super::session::EventBus;

pub struct AppState {
    pub handle: Arc<DroneHandle>,
    pub pipeline: Arc<FramePipeline>,
    pub diagnosis: Arc<DiagnosisWorkflow>,
    pub mission: Arc<MissionController>,
    pub status_cache: Arc<StatusCache>,
    pub bus: EventBus,
}

/// Bridges `FramePipeline` output events onto the shared bus.
pub struct BusPipelineSink(pub EventBus);
impl PipelineEventSink for BusPipelineSink {
    fn on_marker_seen(&self, observation: &MarkerObservation) {
        self.0.publish(ServerEvent::MarkerDetected {
            plant_id: observation.id,
            bbox: observation.bbox,
            decoded_text: observation.decoded_text.clone(),
        });
        if observation.id.is_some() {
            self.0.publish(ServerEvent::MarkerPlantDetected {
                id: observation.id,
                decoded_text: observation.decoded_text.clone(),
            });
        }
    }
    fn on_diagnosis_cooldown(&self, plant_id: i64, remaining_secs: f64) {
        self.0.publish(ServerEvent::DiagnosisCooldown { plant_id, remaining_secs });
    }
    fn on_object_summary(&self, summary: &DetectionSummary) {
        self.0.publish(ServerEvent::ObjectSummary(summary.clone()));
    }
    fn on_frame(&self, frame: &Frame<ClientNative>, seq: u64, jpeg_quality: u8) {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;
        let image = frame.to_rgb_image();
        let mut buf = Vec::new();
        if image
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageOutputFormat::Jpeg(jpeg_quality))
            .is_ok()
        {
            self.0.publish(ServerEvent::VideoFrame { seq, jpeg_base64: BASE64.encode(buf) });
        }
    }
}

/// Bridges `DiagnosisWorkflow` progress events onto the shared bus. A
/// zero-percent progress tick is the workflow's "just started" signal and is
/// surfaced as its own event; an `ai_config` category error means the
/// workflow never started at all, so it is distinguished from a mid-run
/// failure.
pub struct BusDiagnosisSink(pub EventBus);
impl DiagnosisEventSink for BusDiagnosisSink {
    fn on_progress(&self, plant_id: i64, stage: Stage, message: &str, percent: u8) {
        if percent == 0 {
            self.0.publish(ServerEvent::DiagnosisStarted { plant_id });
        }
        self.0.publish(ServerEvent::DiagnosisProgress {
            plant_id,
            stage: stage.as_str().to_string(),
            message: message.to_string(),
            percent,
        });
    }
    fn on_cooldown(&self, plant_id: i64, remaining: Duration) {
        self.0.publish(ServerEvent::DiagnosisCooldown {
            plant_id,
            remaining_secs: remaining.as_secs_f64(),
        });
    }
    fn on_error(&self, plant_id: i64, error: &SystemError) {
        if error.category == crate::error::ErrorCategory::AiConfig {
            self.0.publish(ServerEvent::DiagnosisConfigError { plant_id, error: error.clone() });
        } else {
            self.0.publish(ServerEvent::DiagnosisError { plant_id, error: error.clone() });
        }
    }
    fn on_complete(&self, report: &crate::types::DiagnosisReport) {
        self.0.publish(ServerEvent::DiagnosisComplete(report.clone()));
    }
}

/// Bridges `MissionController` lifecycle events onto the shared bus.
pub struct BusMissionSink(pub EventBus);
impl MissionEventSink for BusMissionSink {
    fn on_status(&self, message: &str) {
        self.0.publish(ServerEvent::MissionLog { message: message.to_string() });
    }
    fn on_position(&self, update: &PositionUpdate) {
        self.0.publish(ServerEvent::MissionPosition {
            current_pad: update.current_pad,
            x: update.x,
            y: update.y,
            z: update.z,
            target_pad: update.target_pad,
            progress: update.progress,
            note: update.note.clone(),
        });
    }
    fn on_phase(&self, _phase: MissionPhase) {}
}

/// Polls the driver for a fresh snapshot and runs it through the status
/// cache, returning a `DroneStatus` event only when the cache says the
/// snapshot deserves a broadcast (§4.1, §2 "C1 gates every telemetry
/// broadcast out of C9"). Used by the periodic status-sync loop; the direct
/// `get_drone_status` query always replies regardless of the cache's
/// decision, since a client explicitly asking for the current status wants
/// an answer, not a suppression.
pub async fn poll_and_maybe_broadcast(state: &AppState) -> Option<ServerEvent> {
    let status = poll_status(&state.handle).await;
    let (should_broadcast, _changed) = state.status_cache.update(status.clone());
    if should_broadcast {
        info!(battery = status.battery, height = status.height_cm, "drone status updated");
        Some(ServerEvent::DroneStatus(status))
    } else {
        None
    }
}

async fn poll_status(handle: &DroneHandle) -> DroneStatus {
    let driver = handle.driver();
    DroneStatus {
        connected: driver.is_connected(),
        flying: driver.is_flying(),
        battery: driver.battery().await.unwrap_or(0),
        temperature: driver.temperature().await.unwrap_or(0),
        height_cm: driver.height().await.unwrap_or(0),
        position: driver.position().await.unwrap_or(Position::default()),
        wifi_signal: driver.wifi_signal().await.unwrap_or(0),
        flight_time_s: driver.flight_time().await.unwrap_or(0),
        mission_pad_id: driver.mission_pad_id().await.unwrap_or(-1),
        captured_at: Some(std::time::Instant::now()),
    }
}

/// Executes one inbound command and returns the direct reply event(s). Side
/// effects (status broadcasts, diagnosis progress, mission logs) arrive
/// separately on the shared bus via the sinks wired in at startup.
///
/// Every inbound command produces exactly one direct response (§4.9); a
/// `drone_command` handler acknowledges before the underlying operation
/// resolves would require a fire-and-forget split the driver's blocking
/// contract doesn't offer here, so the ack simply carries the completed
/// outcome — execution is fast enough (bounded UDP round trip) that this
/// stays within spirit of "ack before long-running work".
pub async fn dispatch(state: &AppState, command: ClientCommand) -> Vec<ServerEvent> {
    let driver = state.handle.driver();
    match command {
        ClientCommand::Ping => vec![ServerEvent::Pong],

        ClientCommand::ConnectDrone => {
            let result = driver.connect().await;
            if result.is_ok() {
                let status = poll_status(&state.handle).await;
                state.status_cache.update(status.clone());
                state.bus.publish(ServerEvent::DroneStatus(status));
            }
            command_response("connect_drone", result)
        }
        ClientCommand::DisconnectDrone => command_response("disconnect_drone", driver.end().await),
        ClientCommand::DroneTakeoff => command_response("drone_takeoff", driver.takeoff().await),
        ClientCommand::DroneLand => command_response("drone_land", driver.land().await),

        ClientCommand::DroneCommand { action, parameters } => dispatch_drone_command(driver, &action, &parameters).await,

        ClientCommand::ManualControl { left_right, forward_back, up_down, yaw } => {
            command_response("manual_control", driver.send_rc_control(left_right, forward_back, up_down, yaw).await)
        }

        ClientCommand::StartVideo => {
            state.pipeline.set_video_enabled(true);
            vec![ServerEvent::DetectionStatus { kind: "video".to_string(), enabled: true }]
        }
        ClientCommand::StopVideo => {
            state.pipeline.set_video_enabled(false);
            vec![ServerEvent::DetectionStatus { kind: "video".to_string(), enabled: false }]
        }
        ClientCommand::StartObjectDetection => {
            state.pipeline.set_object_detection_enabled(true);
            vec![ServerEvent::DetectionStatus { kind: "object_detection".to_string(), enabled: true }]
        }
        ClientCommand::StopObjectDetection => {
            state.pipeline.set_object_detection_enabled(false);
            vec![ServerEvent::DetectionStatus { kind: "object_detection".to_string(), enabled: false }]
        }
        ClientCommand::StartMarkerDetection => {
            state.pipeline.set_marker_detection_enabled(true);
            vec![ServerEvent::DetectionStatus { kind: "marker_detection".to_string(), enabled: true }]
        }
        ClientCommand::StopMarkerDetection => {
            state.pipeline.set_marker_detection_enabled(false);
            vec![ServerEvent::DetectionStatus { kind: "marker_detection".to_string(), enabled: false }]
        }
        ClientCommand::StartDiagnosisWorkflow => {
            state.diagnosis.set_enabled(true);
            vec![ServerEvent::DetectionStatus { kind: "diagnosis_workflow".to_string(), enabled: true }]
        }
        ClientCommand::StopDiagnosisWorkflow => {
            state.diagnosis.set_enabled(false);
            vec![ServerEvent::DetectionStatus { kind: "diagnosis_workflow".to_string(), enabled: false }]
        }

        ClientCommand::SetMarkerCooldown { seconds } => {
            state.pipeline.set_marker_cooldown(Duration::from_secs(seconds));
            vec![ServerEvent::MarkerCooldownUpdated {
                active: state.pipeline.active_marker_cooldowns(),
                cooldown_secs: state.pipeline.marker_cooldown_seconds(),
            }]
        }
        ClientCommand::GetMarkerCooldownStatus => vec![ServerEvent::MarkerCooldownStatus {
            active: state.pipeline.active_marker_cooldowns(),
            cooldown_secs: state.pipeline.marker_cooldown_seconds(),
        }],
        ClientCommand::ClearMarkerCooldowns => {
            state.pipeline.clear_marker_cooldowns();
            vec![ServerEvent::MarkerCooldownsCleared { cooldown_secs: state.pipeline.marker_cooldown_seconds() }]
        }

        ClientCommand::SetAiConfig { provider, model, api_key, api_base, temperature, max_tokens } => {
            let Some(provider) = Provider::parse(&provider) else {
                return vec![error_event(&format!("unknown AI provider: {provider}"))];
            };
            let temperature = temperature.unwrap_or(crate::config::defaults::VLM_DEFAULT_TEMPERATURE);
            let max_tokens = max_tokens.unwrap_or(crate::config::defaults::VLM_DEFAULT_MAX_TOKENS);
            match VlmConfig::new(provider, model, api_key, api_base, temperature, max_tokens) {
                Ok(config) => {
                    let status = ai_config_updated(&config);
                    state.diagnosis.set_ai_config(config);
                    vec![status]
                }
                Err(e) => vec![error_event(&e.to_string())],
            }
        }
        ClientCommand::GetAiConfigStatus => vec![match state.diagnosis.ai_config_snapshot() {
            Some(config) => ai_config_status(&config),
            None => ServerEvent::AiConfigStatus { configured: false, provider: None, model: None, supports_vision: false },
        }],

        ClientCommand::ChallengeCruiseStart { rounds, height, stay_duration } => {
            if let Some(rounds) = rounds {
                state.mission.set_rounds(rounds);
            }
            if let Some(height_cm) = height {
                state.mission.set_height(height_cm);
            }
            if let Some(stay) = stay_duration {
                state.mission.set_stay_duration(stay);
            }
            state.mission.start();
            vec![ServerEvent::MissionStatus(state.mission.state())]
        }
        ClientCommand::ChallengeCruiseStop => {
            state.mission.stop().await;
            vec![ServerEvent::MissionStatus(state.mission.state())]
        }
        ClientCommand::GetMissionStatus => vec![ServerEvent::MissionStatus(state.mission.state())],

        ClientCommand::GetDroneStatus => {
            let status = poll_status(&state.handle).await;
            let (should_broadcast, _) = state.status_cache.update(status.clone());
            if should_broadcast {
                info!(battery = status.battery, height = status.height_cm, "drone status updated");
            }
            vec![ServerEvent::DroneStatus(status)]
        }
        ClientCommand::GetDiagnosisHistory { limit } => {
            vec![ServerEvent::DiagnosisHistory(state.diagnosis.history(limit))]
        }
    }
}

/// A `drone_command` envelope's `action` dispatches to the matching driver
/// operation; unknown actions or malformed `parameters` surface as a failed
/// response rather than a protocol-level error, since the envelope itself
/// parsed fine.
async fn dispatch_drone_command(driver: &dyn crate::driver::DroneDriver, action: &str, parameters: &serde_json::Value) -> Vec<ServerEvent> {
    #[derive(serde::Deserialize, Default)]
    struct CmParam {
        cm: Option<i32>,
    }
    #[derive(serde::Deserialize, Default)]
    struct DegParam {
        degrees: Option<i32>,
    }
    #[derive(serde::Deserialize, Default)]
    struct GoXyzParam {
        x: Option<i32>,
        y: Option<i32>,
        z: Option<i32>,
        speed: Option<i32>,
        pad_id: Option<i32>,
    }

    let result = match action {
        "emergency" => driver.emergency().await,
        "move_forward" | "move_back" | "move_left" | "move_right" | "move_up" | "move_down" => {
            let cm = serde_json::from_value::<CmParam>(parameters.clone()).unwrap_or_default().cm.unwrap_or(0);
            match action {
                "move_forward" => driver.move_forward(cm).await,
                "move_back" => driver.move_back(cm).await,
                "move_left" => driver.move_left(cm).await,
                "move_right" => driver.move_right(cm).await,
                "move_up" => driver.move_up(cm).await,
                _ => driver.move_down(cm).await,
            }
        }
        "rotate_clockwise" | "rotate_counter_clockwise" => {
            let degrees = serde_json::from_value::<DegParam>(parameters.clone()).unwrap_or_default().degrees.unwrap_or(0);
            if action == "rotate_clockwise" {
                driver.rotate_clockwise(degrees).await
            } else {
                driver.rotate_counter_clockwise(degrees).await
            }
        }
        "set_height" => {
            let cm = serde_json::from_value::<CmParam>(parameters.clone()).unwrap_or_default().cm.unwrap_or(0);
            driver.set_height(cm).await
        }
        "go_xyz_speed_mid" => {
            let p = serde_json::from_value::<GoXyzParam>(parameters.clone()).unwrap_or_default();
            driver
                .go_xyz_speed_mid(p.x.unwrap_or(0), p.y.unwrap_or(0), p.z.unwrap_or(0), p.speed.unwrap_or(15), p.pad_id.unwrap_or(-1))
                .await
        }
        other => {
            warn!(action = other, "unknown drone_command action");
            return vec![ServerEvent::DroneCommandResponse {
                command: other.to_string(),
                success: false,
                error: Some(format!("unknown drone_command action: {other}")),
            }];
        }
    };
    command_response(action, result)
}

/// Exactly one direct response per inbound command (§4.9): a failure's
/// detail rides along on the same `DroneCommandResponse`, not as a second
/// `error` reply.
fn command_response(name: &str, result: Result<(), crate::driver::DriverError>) -> Vec<ServerEvent> {
    match result {
        Ok(()) => vec![ServerEvent::DroneCommandResponse { command: name.to_string(), success: true, error: None }],
        Err(e) => vec![ServerEvent::DroneCommandResponse { command: name.to_string(), success: false, error: Some(e.to_string()) }],
    }
}

fn ai_config_status(config: &VlmConfig) -> ServerEvent {
    ServerEvent::AiConfigStatus {
        configured: true,
        provider: Some(format!("{:?}", config.provider).to_lowercase()),
        model: Some(config.model.clone()),
        supports_vision: config.supports_vision,
    }
}

fn ai_config_updated(config: &VlmConfig) -> ServerEvent {
    ServerEvent::AiConfigUpdated {
        configured: true,
        provider: Some(format!("{:?}", config.provider).to_lowercase()),
        model: Some(config.model.clone()),
        supports_vision: config.supports_vision,
    }
}

fn error_event(message: &str) -> ServerEvent {
    ServerEvent::Error { message: message.to_string() }
}

/// A `DiagnosisEventSink`/`MissionEventSink` pair that drops every event —
/// used when wiring a headless pipeline without a live control plane (tests,
/// `--reset-state` bootstraps).
pub fn noop_diagnosis_sink() -> Arc<dyn DiagnosisEventSink> {
    Arc::new(NoOpSink)
}
