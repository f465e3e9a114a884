//! AVIAN-OS - Autonomous inspection drone backend orchestrator.
//!
//! Real-time control-plane server bridging a commodity quadrotor to a
//! camera pipeline, a marker-triggered VLM diagnosis workflow, and a
//! waypoint mission controller.
//!
//! # Usage
//!
//! ```bash
//! # Run with an in-memory simulated drone
//! cargo run --release
//!
//! # Bind to a specific address
//! cargo run --release -- --addr 0.0.0.0:3002
//! ```
//!
//! # Environment Variables
//!
//! - `AGENT_PORT`: control-plane bind port (default 3002)
//! - `AI_PROVIDER`, `*_API_KEY`, `*_API_BASE`: VLM bootstrap defaults
//! - `MODELS_DIR`: model registry sidecar directory
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use avian_os::config::{self, AppConfig};
use avian_os::control_plane::{
    noop_diagnosis_sink, poll_and_maybe_broadcast, router, AppState, BusDiagnosisSink, BusMissionSink, BusPipelineSink, EventBus,
};
use avian_os::detectors::marker::{MarkerDetector, NoOpMarkerDecoder};
use avian_os::detectors::object::ObjectDetector;
use avian_os::diagnosis::DiagnosisWorkflow;
use avian_os::driver::{DroneDriver, DroneHandle, SimDriver};
use avian_os::mission::MissionController;
use avian_os::model_registry::ModelRegistry;
use avian_os::pipeline::FramePipeline;
use avian_os::segmentation::SegmentationService;
use avian_os::status_cache::StatusCache;
use avian_os::vlm::{Provider, VlmAdapter, VlmConfig};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "avian")]
#[command(about = "AVIAN-OS autonomous inspection drone backend orchestrator")]
#[command(version)]
struct CliArgs {
    /// Override the control-plane bind address (default: "0.0.0.0:3002")
    #[arg(short, long)]
    addr: Option<String>,

    /// Path to the model registry sidecar directory
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Wipe the model registry sidecar on startup.
    /// WARNING: this is destructive and cannot be undone!
    /// Can also be set via the `RESET_STATE=true` environment variable.
    #[arg(long)]
    reset_state: bool,
}

fn should_reset_state(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    std::env::var("RESET_STATE")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn reset_model_registry(models_dir: &std::path::Path) -> Result<()> {
    if !models_dir.exists() {
        info!("model registry directory does not exist, nothing to reset");
        return Ok(());
    }
    warn!("RESET_STATE requested — wiping model registry sidecar at {}", models_dir.display());
    std::fs::remove_dir_all(models_dir).context("failed to remove model registry directory")?;
    Ok(())
}

/// Task identification for supervisor logging.
#[derive(Debug, Clone, Copy)]
enum TaskName {
    ControlPlane,
    FramePipeline,
    StatusSync,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ControlPlane => write!(f, "ControlPlane"),
            Self::FramePipeline => write!(f, "FramePipeline"),
            Self::StatusSync => write!(f, "StatusSync"),
        }
    }
}

fn bootstrap_ai_config(cfg: &config::VlmBootstrapConfig) -> Option<VlmConfig> {
    let provider_name = cfg.provider.as_deref()?;
    let Some(provider) = Provider::parse(provider_name) else {
        warn!(provider = provider_name, "unknown AI_PROVIDER bootstrap value, ignoring");
        return None;
    };
    let model = cfg.model.clone().unwrap_or_else(|| "gpt-4o".to_string());
    match VlmConfig::new(
        provider,
        model,
        cfg.api_key.clone(),
        cfg.api_base.clone(),
        config::defaults::VLM_DEFAULT_TEMPERATURE,
        config::defaults::VLM_DEFAULT_MAX_TOKENS,
    ) {
        Ok(config) => {
            info!(provider = ?config.provider, model = %config.model, "bootstrapped AI config from environment");
            Some(config)
        }
        Err(e) => {
            warn!(error = %e, "AI_PROVIDER bootstrap config is invalid, ignoring");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let app_config = AppConfig::load();
    config::init(app_config);
    let cfg = config::get();

    let server_addr = args
        .addr
        .unwrap_or_else(|| format!("{}:{}", cfg.server.bind_addr, cfg.server.port));
    let models_dir = args.models_dir.unwrap_or_else(|| cfg.models.models_dir.clone());

    if should_reset_state(args.reset_state) {
        reset_model_registry(&models_dir)?;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  AVIAN-OS — Autonomous Inspection Drone Backend Orchestrator");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let _model_registry = Arc::new(ModelRegistry::open(&models_dir).context("failed to open model registry")?);
    info!(dir = %models_dir.display(), "model registry ready");

    let driver = Arc::new(SimDriver::default());
    driver.set_frame(avian_os::types::Frame::new(640, 480, vec![0u8; 640 * 480 * 3], 0));
    let handle = Arc::new(DroneHandle::new(driver));
    handle.driver().connect().await.context("failed to connect to drone")?;
    handle.driver().streamon().await.context("failed to start the video stream")?;
    info!("drone driver connected and streaming");

    let bus = EventBus::default();

    let diagnosis = Arc::new(DiagnosisWorkflow::new(
        VlmAdapter::new(reqwest::Client::new()),
        SegmentationService::new(&cfg.segmentation),
        &cfg.diagnosis,
    ));
    if let Some(bootstrap) = bootstrap_ai_config(&cfg.vlm_bootstrap) {
        diagnosis.set_ai_config(bootstrap);
    }

    let pipeline = Arc::new(FramePipeline::new(
        Arc::clone(&handle),
        ObjectDetector::no_op(),
        MarkerDetector::new(Arc::new(NoOpMarkerDecoder), std::time::Duration::from_secs(cfg.marker.cooldown_secs)),
        Arc::clone(&diagnosis),
        Arc::new(BusPipelineSink(bus.clone())),
        Arc::new(BusDiagnosisSink(bus.clone())) as Arc<dyn avian_os::diagnosis::DiagnosisEventSink>,
        &cfg.pipeline,
    ));
    let _ = noop_diagnosis_sink; // kept for headless wiring in tests, unused on this path

    let mission = Arc::new(MissionController::new(
        Arc::clone(&handle),
        Arc::new(BusMissionSink(bus.clone())),
        &cfg.mission,
    ));
    {
        let pipeline_for_cleanup = Arc::clone(&pipeline);
        mission.on_stop(move || {
            pipeline_for_cleanup.set_marker_detection_enabled(false);
        });
    }

    let status_cache = Arc::new(StatusCache::from_config(&cfg.status_cache));

    let state = Arc::new(AppState {
        handle: Arc::clone(&handle),
        pipeline: Arc::clone(&pipeline),
        diagnosis: Arc::clone(&diagnosis),
        mission: Arc::clone(&mission),
        status_cache: Arc::clone(&status_cache),
        bus: bus.clone(),
    });

    let app = router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("failed to bind control plane to {server_addr}"))?;
    info!(addr = %server_addr, "control plane listening");

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    let http_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[ControlPlane] task starting");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                http_cancel.cancelled().await;
                info!("[ControlPlane] received shutdown signal");
            })
            .await
            .map(|()| TaskName::ControlPlane)
            .map_err(|e| anyhow::anyhow!("control plane server error: {e}"))
    });

    let pipeline_cancel = cancel_token.clone();
    let pipeline_for_run = Arc::clone(&pipeline);
    task_set.spawn(async move {
        info!("[FramePipeline] task starting");
        pipeline_for_run.run(pipeline_cancel).await;
        Ok(TaskName::FramePipeline)
    });

    let status_cancel = cancel_token.clone();
    task_set.spawn(async move {
        info!("[StatusSync] task starting");
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(cfg.status_cache.min_broadcast_interval_ms));
        loop {
            tokio::select! {
                () = status_cancel.cancelled() => {
                    info!("[StatusSync] received shutdown signal");
                    return Ok(TaskName::StatusSync);
                }
                _ = ticker.tick() => {
                    if let Some(event) = poll_and_maybe_broadcast(&state).await {
                        bus.publish(event);
                    }
                }
            }
        }
    });

    info!("supervisor: all tasks spawned, monitoring...");
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(name))) => info!("supervisor: task {name} completed normally"),
                    Some(Ok(Err(e))) => {
                        error!("supervisor: task failed: {e}");
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("supervisor: task panicked: {e}");
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("task panicked: {e}"));
                    }
                    None => {
                        info!("supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    mission.stop().await;
    info!("✓ AVIAN-OS shutdown complete");
    Ok(())
}
