use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    Idle,
    TakingOff,
    Searching,
    Recovering,
    Aligning,
    Dwelling,
    Transiting,
    PrepareLanding,
    Landing,
    Done,
    Aborted,
}

impl std::fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::TakingOff => "taking_off",
            Self::Searching => "searching",
            Self::Recovering => "recovering",
            Self::Aligning => "aligning",
            Self::Dwelling => "dwelling",
            Self::Transiting => "transiting",
            Self::PrepareLanding => "prepare_landing",
            Self::Landing => "landing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// A running or completed mission's parameters and progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionState {
    pub target_pads: Vec<i32>,
    pub current_leg: usize,
    pub dwell_seconds: f64,
    pub rounds: u32,
    pub rounds_completed: u32,
    pub height_cm: i32,
    pub confirmed_pad: Option<i32>,
    pub phase: MissionPhase,
}

impl MissionState {
    pub fn new(target_pads: Vec<i32>, rounds: u32, dwell_seconds: f64, height_cm: i32) -> Self {
        Self {
            target_pads,
            current_leg: 0,
            dwell_seconds,
            rounds,
            rounds_completed: 0,
            height_cm,
            confirmed_pad: None,
            phase: MissionPhase::Idle,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, MissionPhase::Done | MissionPhase::Aborted)
    }
}
