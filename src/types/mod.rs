//! Shared data model (§3): the types every component passes across its
//! boundaries.

pub mod cooldown;
pub mod detection;
pub mod diagnosis;
pub mod drone_status;
pub mod frame;
pub mod geometry;
pub mod marker;
pub mod mission;

pub use cooldown::CooldownEntry;
pub use detection::{Detection, DetectionSummary};
pub use diagnosis::{DiagnosisReport, Severity};
pub use drone_status::DroneStatus;
pub use frame::{CameraNative, ClientNative, Frame, InferenceNative};
pub use geometry::{Point, Quad, Rect};
pub use marker::MarkerObservation;
pub use mission::{MissionPhase, MissionState};
