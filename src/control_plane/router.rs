//! The control-plane HTTP/WebSocket surface (§4.9): one upgradeable `/ws`
//! endpoint carrying the bidirectional command/event channel.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::defaults;

use super::commands::{dispatch, AppState};
use super::protocol::{ClientCommand, ServerEvent, KNOWN_COMMAND_TYPES};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.max_message_size(defaults::MAX_MESSAGE_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.bus.subscribe();
    let mut ping_interval = tokio::time::interval(Duration::from_secs(defaults::PING_INTERVAL_SECS));
    let idle_timeout = Duration::from_secs(defaults::CLIENT_IDLE_TIMEOUT_SECS);

    let connected = state.handle.driver().is_connected();
    if !send_event(&mut sender, &ServerEvent::ConnectionEstablished { connected }).await {
        return;
    }

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !send_event(&mut sender, &event).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "client fell behind the event bus, dropping skipped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = tokio::time::timeout(idle_timeout, receiver.next()) => {
                match incoming {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        handle_client_text(&state, &mut sender, &text).await;
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                    Ok(Some(Ok(_))) => {}
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, "websocket read error, disconnecting");
                        break;
                    }
                    Err(_) => {
                        info!("client idle timeout, disconnecting");
                        break;
                    }
                }
            }
        }
    }
}

/// Unknown `type` values are forward-compatible and silently dropped
/// (§6.1); only genuinely malformed JSON, or a known type with malformed
/// `data`, is surfaced as an `error` event.
async fn handle_client_text(state: &Arc<AppState>, sender: &mut (impl SinkExt<Message> + Unpin), text: &str) {
    let envelope: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            let _ = send_event(sender, &ServerEvent::Error { message: format!("invalid command: {e}") }).await;
            return;
        }
    };

    match envelope.get("type").and_then(serde_json::Value::as_str) {
        Some(type_name) if KNOWN_COMMAND_TYPES.contains(&type_name) => {}
        Some(type_name) => {
            warn!(type_name, "unknown command type, dropping silently");
            return;
        }
        None => {
            let _ = send_event(sender, &ServerEvent::Error { message: "missing or non-string \"type\" field".to_string() }).await;
            return;
        }
    }

    match serde_json::from_value::<ClientCommand>(envelope) {
        Ok(command) => {
            for reply in dispatch(state, command).await {
                if !send_event(sender, &reply).await {
                    break;
                }
            }
        }
        Err(e) => {
            let _ = send_event(sender, &ServerEvent::Error { message: format!("invalid command: {e}") }).await;
        }
    }
}

async fn send_event(sender: &mut (impl SinkExt<Message> + Unpin), event: &ServerEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to serialize outbound event");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{BusDiagnosisSink, BusMissionSink, BusPipelineSink, EventBus};
    use crate::detectors::marker::{MarkerDetector, NoOpMarkerDecoder};
    use crate::detectors::object::ObjectDetector;
    use crate::diagnosis::DiagnosisWorkflow;
    use crate::driver::{DroneHandle, SimDriver};
    use crate::mission::MissionController;
    use crate::pipeline::FramePipeline;
    use crate::segmentation::SegmentationService;
    use crate::status_cache::StatusCache;
    use crate::vlm::VlmAdapter;
    use futures::channel::mpsc;
    use futures::StreamExt as _;

    fn test_state() -> Arc<AppState> {
        let driver = Arc::new(SimDriver::default());
        let handle = Arc::new(DroneHandle::new(driver));
        let bus = EventBus::default();

        let diagnosis = Arc::new(DiagnosisWorkflow::new(
            VlmAdapter::new(reqwest::Client::new()),
            SegmentationService::new(&crate::config::SegmentationConfig::default()),
            &crate::config::DiagnosisConfig::default(),
        ));
        let pipeline = Arc::new(FramePipeline::new(
            Arc::clone(&handle),
            ObjectDetector::no_op(),
            MarkerDetector::new(Arc::new(NoOpMarkerDecoder), Duration::from_secs(60)),
            Arc::clone(&diagnosis),
            Arc::new(BusPipelineSink(bus.clone())),
            Arc::new(BusDiagnosisSink(bus.clone())),
            &crate::config::PipelineConfig::default(),
        ));
        let mission = Arc::new(MissionController::new(
            Arc::clone(&handle),
            Arc::new(BusMissionSink(bus.clone())),
            &crate::config::MissionConfig::default(),
        ));
        let status_cache = Arc::new(StatusCache::from_config(&crate::config::StatusCacheConfig::default()));

        Arc::new(AppState { handle, pipeline, diagnosis, mission, status_cache, bus })
    }

    async fn collect_reply_types(text: &str) -> Vec<String> {
        let state = test_state();
        let (mut tx, rx) = mpsc::unbounded();
        handle_client_text(&state, &mut tx, text).await;
        drop(tx);
        rx.filter_map(|msg| async move {
            match msg {
                Message::Text(text) => serde_json::from_str::<serde_json::Value>(&text)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string)),
                _ => None,
            }
        })
        .collect()
        .await
    }

    #[tokio::test]
    async fn unknown_type_is_silently_dropped() {
        let replies = collect_reply_types(r#"{"type":"this_is_not_a_real_command","data":{}}"#).await;
        assert!(replies.is_empty(), "unknown type must yield no response, got {replies:?}");
    }

    #[tokio::test]
    async fn malformed_json_yields_an_error_event() {
        let replies = collect_reply_types("{not json at all").await;
        assert_eq!(replies, vec!["error".to_string()]);
    }

    #[tokio::test]
    async fn known_type_with_malformed_data_yields_an_error_event() {
        let replies = collect_reply_types(r#"{"type":"manual_control","data":{"left_right":"not-a-number"}}"#).await;
        assert_eq!(replies, vec!["error".to_string()]);
    }

    #[tokio::test]
    async fn known_type_with_valid_data_dispatches() {
        let replies = collect_reply_types(r#"{"type":"ping"}"#).await;
        assert_eq!(replies, vec!["pong".to_string()]);
    }
}
