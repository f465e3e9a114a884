/// A single entry in a cooldown map. Monotonic-time based so it survives
/// wall-clock jumps (§3 invariants). Owned independently by C2 (marker UI
/// cooldown) and C6 (diagnosis work-gating cooldown) — deliberately not
/// shared, see the design rationale for the duplication.
#[derive(Debug, Clone, Copy)]
pub struct CooldownEntry {
    pub expires_at: std::time::Instant,
}

impl CooldownEntry {
    pub fn starting_now(duration: std::time::Duration) -> Self {
        Self {
            expires_at: std::time::Instant::now() + duration,
        }
    }

    pub fn is_expired(&self) -> bool {
        std::time::Instant::now() >= self.expires_at
    }

    pub fn remaining(&self) -> std::time::Duration {
        self.expires_at
            .saturating_duration_since(std::time::Instant::now())
    }
}
