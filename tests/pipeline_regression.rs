//! End-to-end command-dispatch regression tests: wires a full `AppState`
//! against a `SimDriver` and drives it through `dispatch()` exactly as the
//! control-plane router does per inbound websocket message.

use std::sync::Arc;
use std::time::Duration;

use avian_os::config::{DiagnosisConfig, MissionConfig, PipelineConfig, SegmentationConfig, StatusCacheConfig};
use avian_os::control_plane::{dispatch, AppState, BusDiagnosisSink, BusMissionSink, BusPipelineSink, ClientCommand, EventBus, ServerEvent};
use avian_os::detectors::marker::{MarkerDetector, NoOpMarkerDecoder};
use avian_os::detectors::object::ObjectDetector;
use avian_os::diagnosis::{DiagnosisEventSink, DiagnosisWorkflow};
use avian_os::driver::{DroneHandle, SimDriver};
use avian_os::mission::MissionController;
use avian_os::pipeline::FramePipeline;
use avian_os::segmentation::SegmentationService;
use avian_os::status_cache::StatusCache;
use avian_os::vlm::{Provider, VlmAdapter, VlmConfig};

fn test_state_with_pads(pad_feed: Vec<i32>) -> Arc<AppState> {
    let driver = Arc::new(SimDriver::new(pad_feed));
    let handle = Arc::new(DroneHandle::new(driver));
    let bus = EventBus::default();

    let diagnosis = Arc::new(DiagnosisWorkflow::new(
        VlmAdapter::new(reqwest::Client::new()),
        SegmentationService::new(&SegmentationConfig::default()),
        &DiagnosisConfig::default(),
    ));

    let pipeline = Arc::new(FramePipeline::new(
        Arc::clone(&handle),
        ObjectDetector::no_op(),
        MarkerDetector::new(Arc::new(NoOpMarkerDecoder), Duration::from_secs(60)),
        Arc::clone(&diagnosis),
        Arc::new(BusPipelineSink(bus.clone())),
        Arc::new(BusDiagnosisSink(bus.clone())) as Arc<dyn DiagnosisEventSink>,
        &PipelineConfig::default(),
    ));

    let mission = Arc::new(MissionController::new(
        Arc::clone(&handle),
        Arc::new(BusMissionSink(bus.clone())),
        &MissionConfig { target_pads: vec![1, 6], rounds: 1, height_cm: 100, stay_duration_secs: 0.01 },
    ));

    let status_cache = Arc::new(StatusCache::from_config(&StatusCacheConfig::default()));

    Arc::new(AppState {
        handle,
        pipeline,
        diagnosis,
        mission,
        status_cache,
        bus,
    })
}

#[tokio::test]
async fn connect_then_takeoff_then_land_round_trips() {
    let state = test_state_with_pads(vec![-1]);

    let events = dispatch(&state, ClientCommand::ConnectDrone).await;
    assert!(matches!(events.as_slice(), [ServerEvent::DroneCommandResponse { success: true, .. }]));

    let events = dispatch(&state, ClientCommand::DroneTakeoff).await;
    assert!(matches!(events.as_slice(), [ServerEvent::DroneCommandResponse { success: true, .. }]));
    assert!(state.handle.driver().is_flying());

    let events = dispatch(&state, ClientCommand::DroneLand).await;
    assert!(matches!(events.as_slice(), [ServerEvent::DroneCommandResponse { success: true, .. }]));
    assert!(!state.handle.driver().is_flying());
}

#[tokio::test]
async fn moving_before_takeoff_is_rejected() {
    let state = test_state_with_pads(vec![-1]);
    dispatch(&state, ClientCommand::ConnectDrone).await;

    let events = dispatch(
        &state,
        ClientCommand::DroneCommand { action: "move_forward".to_string(), parameters: serde_json::json!({ "cm": 50 }) },
    )
    .await;
    match events.as_slice() {
        [ServerEvent::DroneCommandResponse { success: false, error: Some(_), .. }] => {}
        other => panic!("expected exactly one failed command response carrying the error, got {other:?}"),
    }
}

#[tokio::test]
async fn out_of_range_move_is_rejected_after_takeoff() {
    let state = test_state_with_pads(vec![-1]);
    dispatch(&state, ClientCommand::ConnectDrone).await;
    dispatch(&state, ClientCommand::DroneTakeoff).await;

    let events = dispatch(
        &state,
        ClientCommand::DroneCommand { action: "move_forward".to_string(), parameters: serde_json::json!({ "cm": 5000 }) },
    )
    .await;
    assert!(matches!(events.as_slice(), [ServerEvent::DroneCommandResponse { success: false, error: Some(_), .. }]));
}

#[tokio::test]
async fn drone_status_reflects_driver_state() {
    let state = test_state_with_pads(vec![-1]);
    dispatch(&state, ClientCommand::ConnectDrone).await;
    dispatch(&state, ClientCommand::DroneTakeoff).await;

    let events = dispatch(&state, ClientCommand::GetDroneStatus).await;
    match events.as_slice() {
        [ServerEvent::DroneStatus(status)] => {
            assert!(status.connected);
            assert!(status.flying);
            assert_eq!(status.height_cm, 100);
        }
        other => panic!("expected a single drone_status event, got {other:?}"),
    }
}

#[tokio::test]
async fn marker_cooldown_commands_round_trip() {
    let state = test_state_with_pads(vec![-1]);

    let events = dispatch(&state, ClientCommand::SetMarkerCooldown { seconds: 45 }).await;
    assert!(matches!(
        events.as_slice(),
        [ServerEvent::MarkerCooldownUpdated { cooldown_secs: 45, active }] if active.is_empty()
    ));

    let events = dispatch(&state, ClientCommand::GetMarkerCooldownStatus).await;
    assert!(matches!(events.as_slice(), [ServerEvent::MarkerCooldownStatus { cooldown_secs: 45, .. }]));

    let events = dispatch(&state, ClientCommand::ClearMarkerCooldowns).await;
    assert!(matches!(events.as_slice(), [ServerEvent::MarkerCooldownsCleared { cooldown_secs: 45 }]));
}

#[tokio::test]
async fn invalid_ai_provider_is_rejected_without_touching_workflow_state() {
    let state = test_state_with_pads(vec![-1]);

    let events = dispatch(
        &state,
        ClientCommand::SetAiConfig {
            provider: "not-a-real-provider".to_string(),
            model: "whatever".to_string(),
            api_key: None,
            api_base: None,
            temperature: None,
            max_tokens: None,
        },
    )
    .await;
    assert!(matches!(events.as_slice(), [ServerEvent::Error { .. }]));
    assert!(state.diagnosis.ai_config_snapshot().is_none());
}

#[tokio::test]
async fn valid_ollama_ai_config_is_accepted_and_reported_back() {
    let state = test_state_with_pads(vec![-1]);

    let events = dispatch(
        &state,
        ClientCommand::SetAiConfig {
            provider: "ollama".to_string(),
            model: "llava".to_string(),
            api_key: None,
            api_base: Some("http://localhost:11434".to_string()),
            temperature: None,
            max_tokens: None,
        },
    )
    .await;
    assert!(matches!(
        events.as_slice(),
        [ServerEvent::AiConfigUpdated { configured: true, supports_vision: true, .. }]
    ));

    let events = dispatch(&state, ClientCommand::GetAiConfigStatus).await;
    assert!(matches!(
        events.as_slice(),
        [ServerEvent::AiConfigStatus { configured: true, supports_vision: true, .. }]
    ));
}

#[tokio::test]
async fn diagnosis_history_starts_empty() {
    let state = test_state_with_pads(vec![-1]);
    let events = dispatch(&state, ClientCommand::GetDiagnosisHistory { limit: None }).await;
    assert!(matches!(events.as_slice(), [ServerEvent::DiagnosisHistory(reports)] if reports.is_empty()));
}

#[tokio::test]
async fn cruise_mission_reaches_a_terminal_phase() {
    let state = test_state_with_pads(vec![-1, 1, 1, 1, 6, 6, 6, 1, 1, 1]);
    dispatch(&state, ClientCommand::ConnectDrone).await;

    let events = dispatch(
        &state,
        ClientCommand::ChallengeCruiseStart { rounds: Some(1), height: Some(100), stay_duration: Some(0.01) },
    )
    .await;
    assert!(matches!(events.as_slice(), [ServerEvent::MissionStatus(_)]));
    assert!(state.mission.is_running());

    for _ in 0..200 {
        if !state.mission.is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(state.mission.state().is_terminal(), "mission should reach a terminal phase within the poll window");
}

#[test]
fn provider_parse_accepts_known_vendors() {
    assert!(Provider::parse("openai").is_some());
    assert!(Provider::parse("anthropic").is_some());
    assert!(Provider::parse("ollama").is_some());
    assert!(Provider::parse("bogus-vendor").is_none());
}

#[test]
fn vlm_config_rejects_out_of_range_temperature() {
    let result = VlmConfig::new(Provider::Ollama, "llava".to_string(), None, None, 9.0, 256);
    assert!(result.is_err());
}
