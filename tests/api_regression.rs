//! In-process control-plane router tests using `tower::ServiceExt::oneshot`.
//! No bound port, no process spawn — runs anywhere the test binary runs.

use std::sync::Arc;

use avian_os::config::{DiagnosisConfig, MissionConfig, PipelineConfig, SegmentationConfig, StatusCacheConfig};
use avian_os::control_plane::{router, AppState, BusDiagnosisSink, BusMissionSink, BusPipelineSink, EventBus};
use avian_os::detectors::marker::{MarkerDetector, NoOpMarkerDecoder};
use avian_os::detectors::object::ObjectDetector;
use avian_os::diagnosis::{DiagnosisEventSink, DiagnosisWorkflow};
use avian_os::driver::{DroneDriver, DroneHandle, SimDriver};
use avian_os::mission::MissionController;
use avian_os::pipeline::FramePipeline;
use avian_os::segmentation::SegmentationService;
use avian_os::status_cache::StatusCache;
use avian_os::vlm::VlmAdapter;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

fn test_state() -> Arc<AppState> {
    let driver = Arc::new(SimDriver::default());
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
        MarkerDetector::new(Arc::new(NoOpMarkerDecoder), std::time::Duration::from_secs(60)),
        Arc::clone(&diagnosis),
        Arc::new(BusPipelineSink(bus.clone())),
        Arc::new(BusDiagnosisSink(bus.clone())) as Arc<dyn DiagnosisEventSink>,
        &PipelineConfig::default(),
    ));

    let mission = Arc::new(MissionController::new(
        Arc::clone(&handle),
        Arc::new(BusMissionSink(bus.clone())),
        &MissionConfig::default(),
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
async fn healthz_returns_200() {
    let app = router(test_state());
    let resp = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = router(test_state());
    let resp = app
        .oneshot(Request::builder().uri("/does-not-exist").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ws_upgrade_request_is_accepted() {
    let app = router(test_state());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/ws")
                .header("connection", "upgrade")
                .header("upgrade", "websocket")
                .header("sec-websocket-version", "13")
                .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SWITCHING_PROTOCOLS);
}
