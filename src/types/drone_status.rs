use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A telemetry snapshot (C1 input), captured on a monotonic clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroneStatus {
    pub connected: bool,
    pub flying: bool,
    pub battery: i64,
    pub temperature: i64,
    pub height_cm: i64,
    pub position: Position,
    pub wifi_signal: i64,
    pub flight_time_s: i64,
    /// -1 means "no pad detected".
    pub mission_pad_id: i32,
    #[serde(skip)]
    pub captured_at: Option<std::time::Instant>,
}

impl Default for DroneStatus {
    fn default() -> Self {
        Self {
            connected: false,
            flying: false,
            battery: 0,
            temperature: 0,
            height_cm: 0,
            position: Position::default(),
            wifi_signal: 0,
            flight_time_s: 0,
            mission_pad_id: -1,
            captured_at: Some(std::time::Instant::now()),
        }
    }
}
