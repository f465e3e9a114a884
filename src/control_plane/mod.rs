//! Control plane (C9): the bidirectional WebSocket channel clients use to
//! command the drone and receive status, frame, and mission events.

mod commands;
mod protocol;
mod router;
mod session;

pub use commands::{dispatch, noop_diagnosis_sink, poll_and_maybe_broadcast, AppState, BusDiagnosisSink, BusMissionSink, BusPipelineSink};
pub use protocol::{ClientCommand, ServerEvent};
pub use router::router;
pub use session::EventBus;
