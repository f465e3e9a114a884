//! AVIAN-OS: autonomous inspection drone backend orchestrator.
//!
//! Wires a commodity quadrotor's wire protocol to a camera pipeline with
//! pluggable detectors, a marker-triggered diagnosis workflow, a waypoint
//! mission controller, and a bidirectional control-plane channel.
//!
//! ## Architecture
//!
//! - **Drone Driver**: the consumed interface to the aircraft (§6.2)
//! - **Frame Pipeline**: 30 Hz grab → detect → annotate → publish loop
//! - **Diagnosis Workflow**: marker-triggered 3-stage VLM diagnostic
//! - **Mission Controller**: waypoint patrol state machine
//! - **Control Plane**: the client-facing WebSocket command/event channel

pub mod config;
pub mod control_plane;
pub mod detectors;
pub mod diagnosis;
pub mod driver;
pub mod error;
pub mod mission;
pub mod model_registry;
pub mod pipeline;
pub mod segmentation;
pub mod status_cache;
pub mod types;
pub mod vlm;

pub use config::AppConfig;
pub use control_plane::{AppState, ClientCommand, EventBus, ServerEvent};
pub use driver::{DroneDriver, DroneHandle, DriverError, SimDriver};
pub use mission::MissionController;
pub use pipeline::FramePipeline;
