//! Mission Controller (C8): flies a waypoint pattern between mission pads
//! — out through each configured pad in order, then back to the first —
//! repeating for a configured number of rounds, with pad-loss recovery by
//! rotation search at every step.

mod state_machine;

pub use state_machine::{MissionController, MissionError, MissionEventSink, NoOpMissionSink, PositionUpdate};
