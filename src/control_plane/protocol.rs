//! Wire protocol for the single bidirectional control-plane channel
//! (§4.9): one JSON object per message, tagged by `type`, payload under
//! `data`, with an optional ISO-8601 `timestamp`. Variant names are
//! idiomatic Rust; the `#[serde(rename = ...)]` on each maps them onto the
//! literal wire vocabulary clients and the original bridge agreed on.

use serde::{Deserialize, Serialize};

use crate::error::SystemError;
use crate::types::geometry::Rect;
use crate::types::{DetectionSummary, DiagnosisReport, DroneStatus, MarkerObservation, MissionState};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "connect_drone")]
    ConnectDrone,
    #[serde(rename = "disconnect_drone")]
    DisconnectDrone,
    #[serde(rename = "drone_takeoff")]
    DroneTakeoff,
    #[serde(rename = "drone_land")]
    DroneLand,
    /// Generic action+parameters envelope for arbitrary moves/rotations
    /// that don't warrant their own wire command.
    #[serde(rename = "drone_command")]
    DroneCommand {
        action: String,
        #[serde(default)]
        parameters: serde_json::Value,
    },
    #[serde(rename = "manual_control")]
    ManualControl {
        left_right: i32,
        forward_back: i32,
        up_down: i32,
        yaw: i32,
    },
    #[serde(rename = "start_video")]
    StartVideo,
    #[serde(rename = "stop_video")]
    StopVideo,
    #[serde(rename = "start_object_detection")]
    StartObjectDetection,
    #[serde(rename = "stop_object_detection")]
    StopObjectDetection,
    #[serde(rename = "start_marker_detection")]
    StartMarkerDetection,
    #[serde(rename = "stop_marker_detection")]
    StopMarkerDetection,
    #[serde(rename = "start_diagnosis_workflow")]
    StartDiagnosisWorkflow,
    #[serde(rename = "stop_diagnosis_workflow")]
    StopDiagnosisWorkflow,
    #[serde(rename = "set_marker_cooldown")]
    SetMarkerCooldown { seconds: u64 },
    #[serde(rename = "get_marker_cooldown_status")]
    GetMarkerCooldownStatus,
    #[serde(rename = "clear_marker_cooldowns")]
    ClearMarkerCooldowns,
    #[serde(rename = "set_ai_config")]
    SetAiConfig {
        provider: String,
        model: String,
        api_key: Option<String>,
        api_base: Option<String>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    },
    #[serde(rename = "get_ai_config_status")]
    GetAiConfigStatus,
    #[serde(rename = "challenge_cruise_start")]
    ChallengeCruiseStart {
        rounds: Option<u32>,
        height: Option<i32>,
        #[serde(rename = "stayDuration")]
        stay_duration: Option<f64>,
    },
    #[serde(rename = "challenge_cruise_stop")]
    ChallengeCruiseStop,
    #[serde(rename = "get_mission_status")]
    GetMissionStatus,
    #[serde(rename = "get_drone_status")]
    GetDroneStatus,
    #[serde(rename = "get_diagnosis_history")]
    GetDiagnosisHistory { limit: Option<usize> },
    #[serde(rename = "ping")]
    Ping,
}

/// The wire vocabulary of recognized `type` values, kept in lockstep with
/// `ClientCommand`'s `#[serde(rename = ...)]` tags. §6.1: "Unknown `type`
/// yields no response and is silently dropped (forward-compatible)" — the
/// router consults this list to tell an unknown type apart from a known
/// type with malformed `data`.
pub const KNOWN_COMMAND_TYPES: &[&str] = &[
    "connect_drone",
    "disconnect_drone",
    "drone_takeoff",
    "drone_land",
    "drone_command",
    "manual_control",
    "start_video",
    "stop_video",
    "start_object_detection",
    "stop_object_detection",
    "start_marker_detection",
    "stop_marker_detection",
    "start_diagnosis_workflow",
    "stop_diagnosis_workflow",
    "set_marker_cooldown",
    "get_marker_cooldown_status",
    "clear_marker_cooldowns",
    "set_ai_config",
    "get_ai_config_status",
    "challenge_cruise_start",
    "challenge_cruise_stop",
    "get_mission_status",
    "get_drone_status",
    "get_diagnosis_history",
    "ping",
];

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
#[allow(clippy::large_enum_variant)]
pub enum ServerEvent {
    #[serde(rename = "connection_established")]
    ConnectionEstablished { connected: bool },
    #[serde(rename = "drone_command_response")]
    DroneCommandResponse {
        command: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "detection_status")]
    DetectionStatus { kind: String, enabled: bool },
    #[serde(rename = "status_update")]
    StatusUpdate { message: String },
    #[serde(rename = "drone_status")]
    DroneStatus(DroneStatus),
    #[serde(rename = "video_frame")]
    VideoFrame { seq: u64, jpeg_base64: String },
    #[serde(rename = "object_summary")]
    ObjectSummary(DetectionSummary),
    /// Raw per-frame marker decode (§4.9), fired for every eligible
    /// observation the marker detector returns, carrying its bounding box.
    #[serde(rename = "marker_detected")]
    MarkerDetected { plant_id: Option<i64>, bbox: Rect, decoded_text: String },
    /// Narrower event fired only once the decode resolves to a plant id,
    /// for clients that only care about identified plants.
    #[serde(rename = "marker_plant_detected")]
    MarkerPlantDetected { id: Option<i64>, decoded_text: String },
    #[serde(rename = "diagnosis_started")]
    DiagnosisStarted { plant_id: i64 },
    #[serde(rename = "diagnosis_progress")]
    DiagnosisProgress {
        plant_id: i64,
        stage: String,
        message: String,
        percent: u8,
    },
    #[serde(rename = "diagnosis_complete")]
    DiagnosisComplete(DiagnosisReport),
    #[serde(rename = "diagnosis_history")]
    DiagnosisHistory(Vec<DiagnosisReport>),
    #[serde(rename = "diagnosis_error")]
    DiagnosisError { plant_id: i64, error: SystemError },
    #[serde(rename = "diagnosis_config_error")]
    DiagnosisConfigError { plant_id: i64, error: SystemError },
    #[serde(rename = "diagnosis_cooldown")]
    DiagnosisCooldown { plant_id: i64, remaining_secs: f64 },
    #[serde(rename = "marker_seen_batch")]
    MarkerSeenBatch(Vec<MarkerObservation>),
    #[serde(rename = "mission_status")]
    MissionStatus(MissionState),
    #[serde(rename = "mission_position")]
    MissionPosition {
        current_pad: i32,
        x: f64,
        y: f64,
        z: f64,
        target_pad: i32,
        progress: f64,
        note: String,
    },
    #[serde(rename = "mission_log")]
    MissionLog { message: String },
    #[serde(rename = "marker_cooldown_updated")]
    MarkerCooldownUpdated { active: Vec<i64>, cooldown_secs: u64 },
    #[serde(rename = "marker_cooldown_status")]
    MarkerCooldownStatus { active: Vec<i64>, cooldown_secs: u64 },
    #[serde(rename = "marker_cooldowns_cleared")]
    MarkerCooldownsCleared { cooldown_secs: u64 },
    #[serde(rename = "ai_config_updated")]
    AiConfigUpdated {
        configured: bool,
        provider: Option<String>,
        model: Option<String>,
        supports_vision: bool,
    },
    #[serde(rename = "ai_config_status")]
    AiConfigStatus {
        configured: bool,
        provider: Option<String>,
        model: Option<String>,
        supports_vision: bool,
    },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "pong")]
    Pong,
}
