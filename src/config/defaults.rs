//! System-wide default constants, grouped by subsystem.

// ============================================================================
// Control plane
// ============================================================================

/// Default control-plane bind port.
pub const CONTROL_PLANE_PORT: u16 = 3002;

/// Keepalive ping interval (seconds).
pub const PING_INTERVAL_SECS: u64 = 20;

/// Disconnect a client after this many seconds of silence.
pub const CLIENT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Maximum accepted frame size on the control channel (bytes).
pub const MAX_MESSAGE_FRAME_BYTES: usize = 10 * 1024 * 1024;

// ============================================================================
// Status cache (C1)
// ============================================================================

pub const STATUS_BATTERY_THRESHOLD: i64 = 1;
pub const STATUS_TEMPERATURE_THRESHOLD: i64 = 1;
pub const STATUS_HEIGHT_THRESHOLD: i64 = 5;
pub const STATUS_POSITION_THRESHOLD: f64 = 2.0;

/// Minimum spacing between accepted broadcasts (milliseconds).
pub const STATUS_MIN_BROADCAST_INTERVAL_MS: u64 = 100;

/// Cache entry time-to-live before an unchanged snapshot is forced through
/// at a doubled min-interval (seconds).
pub const STATUS_CACHE_TTL_SECS: u64 = 60;

/// Bounded history ring size.
pub const STATUS_HISTORY_CAPACITY: usize = 100;

// ============================================================================
// Marker detector (C2)
// ============================================================================

/// Per-ID "seen again" cooldown for UI feedback (seconds).
pub const MARKER_COOLDOWN_SECS: u64 = 60;

// ============================================================================
// Segmentation client (C4)
// ============================================================================

pub const SEGMENTATION_HEALTH_TTL_SECS: u64 = 300;
pub const SEGMENTATION_HTTP_TIMEOUT_SECS: u64 = 30;
pub const SEGMENTATION_MAX_RETRIES: u32 = 3;
pub const SEGMENTATION_CONCURRENCY_LIMIT: usize = 3;
pub const SEGMENTATION_DEFAULT_SAMPLE_FRAMES: u32 = 16;

// ============================================================================
// VLM provider adapter (C5)
// ============================================================================

pub const VLM_MASK_PROMPT_TIMEOUT_SECS: u64 = 60;
pub const VLM_DIAGNOSE_TIMEOUT_SECS: u64 = 120;
pub const VLM_DEFAULT_TEMPERATURE: f32 = 0.7;
pub const VLM_DEFAULT_MAX_TOKENS: u32 = 2000;

// ============================================================================
// Diagnosis workflow (C6)
// ============================================================================

/// Per-plant-id diagnosis work-gating cooldown (seconds) — distinct from
/// the marker detector's UI cooldown above.
pub const DIAGNOSIS_COOLDOWN_SECS: u64 = 30;
pub const DIAGNOSIS_HISTORY_CAPACITY: usize = 100;

// ============================================================================
// Frame pipeline (C7)
// ============================================================================

pub const PIPELINE_TARGET_FPS: u32 = 30;
pub const PIPELINE_SUMMARY_INTERVAL_SECS: u64 = 2;
pub const PIPELINE_JPEG_QUALITY: u8 = 80;

// ============================================================================
// Mission controller (C8)
// ============================================================================

pub const MISSION_DEFAULT_ROUNDS: u32 = 3;
pub const MISSION_ROUNDS_MIN: u32 = 1;
pub const MISSION_ROUNDS_MAX: u32 = 10;
pub const MISSION_DEFAULT_HEIGHT_CM: i32 = 100;
pub const MISSION_HEIGHT_MIN_CM: i32 = 40;
pub const MISSION_HEIGHT_MAX_CM: i32 = 300;
pub const MISSION_DEFAULT_STAY_DURATION_SECS: f64 = 3.0;
pub const MISSION_STAY_DURATION_MIN_SECS: f64 = 0.5;
pub const MISSION_STAY_DURATION_MAX_SECS: f64 = 30.0;
pub const MISSION_TAKEOFF_SETTLE_SECS: u64 = 2;
pub const MISSION_SEARCH_POLL_HZ: f64 = 2.0;
pub const MISSION_SEARCH_TIMEOUT_INITIAL_SECS: u64 = 10;
pub const MISSION_SEARCH_TIMEOUT_INFLIGHT_SECS: u64 = 4;
pub const MISSION_REQUIRED_CONSECUTIVE_READS: usize = 3;
pub const MISSION_MAX_ROTATIONS: u32 = 4;
pub const MISSION_ROTATION_DEG: i32 = 30;
pub const MISSION_ALIGN_SPEED_CM_S: i32 = 15;
pub const MISSION_ALIGN_SETTLE_SECS: u64 = 3;
pub const MISSION_ALIGN_CONFIRM_TIMEOUT_SECS: u64 = 3;
pub const MISSION_TRANSIT_RC_VALUE: i32 = 35;
pub const MISSION_TRANSIT_BURST_MS: u64 = 1200;
pub const MISSION_TRANSIT_MAX_ATTEMPTS: u32 = 3;
pub const MISSION_TRANSIT_SEARCH_TIMEOUT_SECS: u64 = 4;
pub const MISSION_LANDING_APPROACH_HEIGHT_CM: i32 = 60;
pub const MISSION_LANDING_FINAL_HEIGHT_CM: i32 = 30;
pub const MISSION_STATUS_DEDUP_WINDOW_SECS: u64 = 1;

// ============================================================================
// Worker shutdown
// ============================================================================

/// Bound on how long a parent waits for a long-lived worker to join after
/// `stop()` before proceeding anyway.
pub const WORKER_JOIN_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Error & recovery (C10)
// ============================================================================

pub const RECOVERY_MAX_ATTEMPTS: u32 = 3;
