use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::defaults;
use crate::driver::{DriverError, DroneHandle};
use crate::types::{MissionPhase, MissionState};

#[derive(Debug, Error, Clone)]
pub enum MissionError {
    #[error("drone driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("mission stopped")]
    Stopped,
    #[error("could not locate pad {pad_id} after recovery search")]
    PadNotFound { pad_id: i32 },
}

/// A progress update emitted while the controller is en route between pads,
/// mirroring the position telemetry a client dashboard plots on a map.
#[derive(Debug, Clone)]
pub struct PositionUpdate {
    pub current_pad: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub target_pad: i32,
    pub progress: f64,
    pub note: String,
}

/// Receives mission lifecycle events. Implemented by the control plane to
/// fan them out to connected clients.
pub trait MissionEventSink: Send + Sync {
    fn on_status(&self, message: &str);
    fn on_position(&self, update: &PositionUpdate);
    fn on_phase(&self, phase: MissionPhase);
}

pub struct NoOpMissionSink;
impl MissionEventSink for NoOpMissionSink {
    fn on_status(&self, _message: &str) {}
    fn on_position(&self, _update: &PositionUpdate) {}
    fn on_phase(&self, _phase: MissionPhase) {}
}

struct Leg {
    to: i32,
    sign: i32,
}

pub struct MissionController {
    handle: Arc<DroneHandle>,
    sink: Arc<dyn MissionEventSink>,
    state: Mutex<MissionState>,
    run: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    cleanup_callbacks: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
    last_status: Mutex<Option<(String, Instant)>>,
    status_dedup_window: Duration,
    rounds: AtomicU32,
}

impl MissionController {
    pub fn new(handle: Arc<DroneHandle>, sink: Arc<dyn MissionEventSink>, cfg: &crate::config::MissionConfig) -> Self {
        let target_pads = if cfg.target_pads.is_empty() {
            vec![1, 6]
        } else {
            cfg.target_pads.clone()
        };
        Self {
            handle,
            sink,
            state: Mutex::new(MissionState::new(target_pads, cfg.rounds, cfg.stay_duration_secs, cfg.height_cm)),
            run: Mutex::new(None),
            cleanup_callbacks: Mutex::new(Vec::new()),
            last_status: Mutex::new(None),
            status_dedup_window: Duration::from_secs(defaults::MISSION_STATUS_DEDUP_WINDOW_SECS),
            rounds: AtomicU32::new(cfg.rounds),
        }
    }

    pub fn state(&self) -> MissionState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn set_rounds(&self, rounds: u32) -> u32 {
        let clamped = rounds.clamp(defaults::MISSION_ROUNDS_MIN, defaults::MISSION_ROUNDS_MAX);
        self.rounds.store(clamped, Ordering::SeqCst);
        self.state.lock().unwrap_or_else(|e| e.into_inner()).rounds = clamped;
        clamped
    }

    pub fn set_height(&self, height_cm: i32) -> i32 {
        let clamped = height_cm.clamp(defaults::MISSION_HEIGHT_MIN_CM, defaults::MISSION_HEIGHT_MAX_CM);
        self.state.lock().unwrap_or_else(|e| e.into_inner()).height_cm = clamped;
        clamped
    }

    pub fn set_stay_duration(&self, secs: f64) -> f64 {
        let clamped = secs.clamp(defaults::MISSION_STAY_DURATION_MIN_SECS, defaults::MISSION_STAY_DURATION_MAX_SECS);
        self.state.lock().unwrap_or_else(|e| e.into_inner()).dwell_seconds = clamped;
        clamped
    }

    /// Registers a callback run (best-effort, never aborting the rest) when
    /// a mission stops, whether by completion or by explicit `stop()`.
    pub fn on_stop(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.cleanup_callbacks.lock().unwrap_or_else(|e| e.into_inner()).push(Box::new(callback));
    }

    pub fn clear_cleanup_callbacks(&self) {
        self.cleanup_callbacks.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn run_cleanup_callbacks(&self) {
        let callbacks = self.cleanup_callbacks.lock().unwrap_or_else(|e| e.into_inner());
        for (i, callback) in callbacks.iter().enumerate() {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback())) {
                Ok(()) => info!(index = i, "mission cleanup callback ran"),
                Err(_) => error!(index = i, "mission cleanup callback panicked"),
            }
        }
    }

    fn emit_status(&self, message: impl Into<String>) {
        let message = message.into();
        let mut last = self.last_status.lock().unwrap_or_else(|e| e.into_inner());
        let dedup = last.as_ref().is_some_and(|(prev, at)| *prev == message && at.elapsed() < self.status_dedup_window);
        if dedup {
            return;
        }
        *last = Some((message.clone(), Instant::now()));
        drop(last);
        let sink = self.sink.clone();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.on_status(&message)));
    }

    fn emit_position(&self, update: PositionUpdate) {
        let sink = self.sink.clone();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.on_position(&update)));
    }

    fn set_phase(&self, phase: MissionPhase) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).phase = phase;
        let sink = self.sink.clone();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.on_phase(phase)));
    }

    /// Starts the mission sequence as a background task. A no-op if one is
    /// already running.
    pub fn start(self: &Arc<Self>) {
        if self.is_running() {
            warn!("mission start requested while one is already running, ignoring");
            return;
        }
        let cancel = CancellationToken::new();
        let controller = Arc::clone(self);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            controller.mission_sequence(token).await;
        });
        *self.run.lock().unwrap_or_else(|e| e.into_inner()) = Some((cancel, join));
    }

    /// Requests the running mission stop, runs cleanup callbacks, and waits
    /// (bounded) for the background task to join.
    pub async fn stop(&self) {
        let handle = self.run.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some((cancel, join)) = handle else {
            return;
        };
        self.emit_status("stopping mission");
        cancel.cancel();
        self.run_cleanup_callbacks();
        if tokio::time::timeout(Duration::from_secs(defaults::WORKER_JOIN_TIMEOUT_SECS), join)
            .await
            .is_err()
        {
            warn!("mission task did not join within the shutdown timeout");
        }
        self.state.lock().unwrap_or_else(|e| e.into_inner()).phase = MissionPhase::Aborted;
    }

    fn legs(&self, target_pads: &[i32]) -> Vec<Leg> {
        let mut legs: Vec<Leg> = target_pads.windows(2).map(|w| Leg { to: w[1], sign: 1 }).collect();
        if target_pads.len() > 1 {
            legs.push(Leg { to: target_pads[0], sign: -1 });
        }
        legs
    }

    async fn mission_sequence(self: Arc<Self>, cancel: CancellationToken) {
        let (target_pads, rounds, height, stay) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            (state.target_pads.clone(), state.rounds, state.height_cm, state.dwell_seconds)
        };
        let driver = self.handle.driver();

        self.set_phase(MissionPhase::TakingOff);
        self.emit_status("taking off");
        if !driver.is_flying() {
            if let Err(e) = driver.takeoff().await {
                error!(error = %e, "mission takeoff failed, aborting");
                self.abort().await;
                return;
            }
        }
        tokio::time::sleep(Duration::from_secs(defaults::MISSION_TAKEOFF_SETTLE_SECS)).await;
        if let Err(e) = driver.set_height(height).await {
            error!(error = %e, "mission could not set target height, aborting");
            self.finish_with_landing_attempt().await;
            return;
        }
        tokio::time::sleep(Duration::from_secs(defaults::MISSION_TAKEOFF_SETTLE_SECS)).await;

        self.set_phase(MissionPhase::Searching);
        self.emit_status("searching for mission pad");
        let Some(start_pad) = self.align_with_mission_pad(target_pads[0]).await else {
            error!("initial mission pad alignment failed, aborting");
            self.finish_with_landing_attempt().await;
            return;
        };

        self.set_phase(MissionPhase::Aligning);
        if let Err(e) = self.precise_positioning_on_pad(start_pad, height).await {
            error!(error = %e, "could not precisely position on the start pad, aborting");
            self.finish_with_landing_attempt().await;
            return;
        }

        let mut current_pad = start_pad;
        self.emit_position(PositionUpdate {
            current_pad,
            x: 0.0,
            y: 0.0,
            z: f64::from(height),
            target_pad: current_pad,
            progress: 0.0,
            note: "on start pad".to_string(),
        });
        self.set_phase(MissionPhase::Dwelling);
        tokio::time::sleep(Duration::from_secs_f64(stay)).await;

        let legs = self.legs(&target_pads);
        for round in 0..rounds {
            if cancel.is_cancelled() {
                break;
            }
            self.set_phase(MissionPhase::Transiting);
            self.emit_status(format!("starting round {} of {rounds}", round + 1));
            let leg_count = legs.len();
            for (i, leg) in legs.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                let progress = 100.0 * (i as f64 + 1.0) / leg_count.max(1) as f64;
                // The very last leg of the very last round returns to the
                // landing pad and flows straight into prepare_landing — it
                // doesn't dwell, matching the "2 * rounds" dwelling-event
                // invariant (one dwell per pad visit except the final one).
                let is_final_leg = round + 1 == rounds && i + 1 == leg_count;
                match self.execute_leg(current_pad, leg.to, leg.sign, height, stay, progress, !is_final_leg).await {
                    Ok(()) => current_pad = leg.to,
                    Err(e) => warn!(error = %e, from = current_pad, to = leg.to, "mission leg did not confirm arrival, continuing"),
                }
            }
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.rounds_completed += 1;
                state.current_leg = 0;
                state.confirmed_pad = Some(current_pad);
            }
            if round + 1 < rounds && !cancel.is_cancelled() {
                tokio::time::sleep(Duration::from_secs(defaults::MISSION_TAKEOFF_SETTLE_SECS)).await;
            }
        }

        self.set_phase(MissionPhase::PrepareLanding);
        self.emit_status("preparing to land");
        if let Err(e) = self.prepare_for_landing(current_pad, height).await {
            warn!(error = %e, "landing preparation did not confirm a pad, landing in place");
        }

        self.set_phase(MissionPhase::Landing);
        self.emit_status("landing");
        if let Err(e) = driver.land().await {
            error!(error = %e, "mission landing command failed");
        }

        self.run_cleanup_callbacks();
        self.set_phase(if cancel.is_cancelled() { MissionPhase::Aborted } else { MissionPhase::Done });
        *self.run.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    async fn abort(&self) {
        let driver = self.handle.driver();
        if driver.is_flying() {
            let _ = driver.land().await;
        }
        self.run_cleanup_callbacks();
        self.set_phase(MissionPhase::Aborted);
        *self.run.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    async fn finish_with_landing_attempt(&self) {
        self.abort().await;
    }

    /// Waits for `pad_id` specifically, requiring
    /// [`defaults::MISSION_REQUIRED_CONSECUTIVE_READS`] equal consecutive
    /// reads before accepting — any other reading resets the streak.
    async fn wait_for_pad(&self, pad_id: i32, timeout: Duration) -> bool {
        let driver = self.handle.driver();
        let deadline = Instant::now() + timeout;
        let mut streak = 0usize;
        while Instant::now() < deadline {
            match driver.mission_pad_id().await {
                Ok(id) if id == pad_id => {
                    streak += 1;
                    if streak >= defaults::MISSION_REQUIRED_CONSECUTIVE_READS {
                        return true;
                    }
                }
                _ => streak = 0,
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        false
    }

    /// Rotates in [`defaults::MISSION_ROTATION_DEG`] steps, sampling three
    /// reads after each rotation and accepting on a 2-of-3 majority — the
    /// supplemented recovery behavior (a single re-poll is not enough to
    /// reject noisy decodes right after a rotation settles).
    async fn find_pad_by_rotation(&self, pad_id: i32, max_rotations: u32) -> Result<bool, MissionError> {
        let driver = self.handle.driver();
        if driver.mission_pad_id().await? == pad_id {
            return Ok(true);
        }
        for _ in 0..max_rotations {
            driver.rotate_clockwise(defaults::MISSION_ROTATION_DEG).await?;
            tokio::time::sleep(Duration::from_millis(1500)).await;
            tokio::time::sleep(Duration::from_millis(500)).await;

            let mut matches = 0;
            for _ in 0..3 {
                if driver.mission_pad_id().await? == pad_id {
                    matches += 1;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            if matches >= 2 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn precise_positioning_on_pad(&self, pad_id: i32, height: i32) -> Result<(), MissionError> {
        let driver = self.handle.driver();
        if !self.wait_for_pad(pad_id, Duration::from_secs(defaults::MISSION_ALIGN_CONFIRM_TIMEOUT_SECS)).await
            && !self.find_pad_by_rotation(pad_id, defaults::MISSION_MAX_ROTATIONS).await?
        {
            return Err(MissionError::PadNotFound { pad_id });
        }
        driver.go_xyz_speed_mid(0, 0, height, defaults::MISSION_ALIGN_SPEED_CM_S, pad_id).await?;
        tokio::time::sleep(Duration::from_secs(defaults::MISSION_ALIGN_SETTLE_SECS)).await;
        if !self.wait_for_pad(pad_id, Duration::from_secs(defaults::MISSION_ALIGN_CONFIRM_TIMEOUT_SECS)).await {
            warn!(pad_id, "could not re-confirm pad after positioning, proceeding anyway");
        }
        Ok(())
    }

    /// Polls for any pad up to the initial search timeout, rotating every
    /// two seconds of elapsed search time, and aligns over whichever pad
    /// first appears.
    async fn align_with_mission_pad(&self, _preferred: i32) -> Option<i32> {
        let driver = self.handle.driver();
        let deadline = Instant::now() + Duration::from_secs(defaults::MISSION_SEARCH_TIMEOUT_INITIAL_SECS);
        let poll_period = Duration::from_secs_f64(1.0 / defaults::MISSION_SEARCH_POLL_HZ);
        let mut last_rotation = Instant::now();
        while Instant::now() < deadline {
            match driver.mission_pad_id().await {
                Ok(id) if id != -1 => {
                    let height = self.state.lock().unwrap_or_else(|e| e.into_inner()).height_cm;
                    let _ = driver.go_xyz_speed_mid(0, 0, height, 20, id).await;
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    return Some(id);
                }
                _ => {}
            }
            if last_rotation.elapsed() >= Duration::from_secs(2) {
                let _ = driver.rotate_clockwise(defaults::MISSION_ROTATION_DEG).await;
                last_rotation = Instant::now();
            }
            tokio::time::sleep(poll_period).await;
        }
        None
    }

    async fn execute_leg(&self, from_pad: i32, to_pad: i32, sign: i32, height: i32, stay: f64, progress: f64, dwell: bool) -> Result<(), MissionError> {
        let found = if self.wait_for_pad(to_pad, Duration::from_secs(defaults::MISSION_SEARCH_TIMEOUT_INFLIGHT_SECS)).await {
            true
        } else {
            let mut located = false;
            for attempt in 0..defaults::MISSION_TRANSIT_MAX_ATTEMPTS {
                self.rc_burst(sign * defaults::MISSION_TRANSIT_RC_VALUE, 0, 0, 0, Duration::from_millis(defaults::MISSION_TRANSIT_BURST_MS)).await?;
                if self.wait_for_pad(to_pad, Duration::from_secs(defaults::MISSION_TRANSIT_SEARCH_TIMEOUT_SECS)).await {
                    located = true;
                    break;
                }
                info!(attempt, to_pad, "transit attempt did not find the target pad, retrying");
            }
            located
        };

        if !found {
            self.find_pad_by_rotation(from_pad, defaults::MISSION_MAX_ROTATIONS).await?;
            return Err(MissionError::PadNotFound { pad_id: to_pad });
        }

        self.precise_positioning_on_pad(to_pad, height).await?;
        self.emit_position(PositionUpdate {
            current_pad: to_pad,
            x: 0.0,
            y: 0.0,
            z: f64::from(height),
            target_pad: to_pad,
            progress,
            note: format!("arrived at pad {to_pad}"),
        });
        if dwell {
            self.set_phase(MissionPhase::Dwelling);
            tokio::time::sleep(Duration::from_secs_f64(stay)).await;
        }
        Ok(())
    }

    async fn prepare_for_landing(&self, target_pad: i32, height: i32) -> Result<(), MissionError> {
        let driver = self.handle.driver();
        if self.wait_for_pad(target_pad, Duration::from_secs(5)).await
            || self.find_pad_by_rotation(target_pad, defaults::MISSION_MAX_ROTATIONS).await?
        {
            driver
                .go_xyz_speed_mid(0, 0, defaults::MISSION_LANDING_APPROACH_HEIGHT_CM, 20, target_pad)
                .await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
            driver
                .go_xyz_speed_mid(0, 0, defaults::MISSION_LANDING_FINAL_HEIGHT_CM, 15, target_pad)
                .await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
        } else {
            // No pad confirmed — land in place rather than risk a blind
            // lateral move.
            let _ = height;
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        Ok(())
    }

    async fn rc_burst(&self, lr: i32, fb: i32, ud: i32, yaw: i32, duration: Duration) -> Result<(), MissionError> {
        self.handle
            .exclusive(move |driver| {
                Box::pin(async move {
                    driver.send_rc_control(lr, fb, ud, yaw).await?;
                    tokio::time::sleep(duration).await;
                    driver.send_rc_control(0, 0, 0, 0).await
                })
            })
            .await
            .map_err(MissionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimDriver;
    use std::sync::atomic::AtomicUsize;

    fn controller() -> Arc<MissionController> {
        let driver = Arc::new(SimDriver::new(vec![-1, 1, 1, 1, 6, 6, 6, 1, 1, 1]));
        let handle = Arc::new(DroneHandle::new(driver));
        let cfg = crate::config::MissionConfig {
            target_pads: vec![1, 6],
            rounds: 1,
            height_cm: 100,
            stay_duration_secs: 0.01,
        };
        Arc::new(MissionController::new(handle, Arc::new(NoOpMissionSink), &cfg))
    }

    #[test]
    fn rounds_clamp_to_allowed_bounds() {
        let controller = controller();
        assert_eq!(controller.set_rounds(0), 1);
        assert_eq!(controller.set_rounds(99), 10);
        assert_eq!(controller.set_rounds(5), 5);
    }

    #[test]
    fn height_clamps_to_allowed_bounds() {
        let controller = controller();
        assert_eq!(controller.set_height(10), 40);
        assert_eq!(controller.set_height(1000), 300);
    }

    #[test]
    fn cleanup_callbacks_all_run_even_if_one_panics() {
        let controller = controller();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        controller.on_stop(move || {
            c1.fetch_add(1, Ordering::SeqCst);
            panic!("simulated cleanup failure");
        });
        let c2 = count.clone();
        controller.on_stop(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        controller.run_cleanup_callbacks();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn status_dedup_suppresses_identical_repeats_within_window() {
        let controller = controller();
        struct Counting(AtomicUsize);
        impl MissionEventSink for Counting {
            fn on_status(&self, _m: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn on_position(&self, _u: &PositionUpdate) {}
            fn on_phase(&self, _p: MissionPhase) {}
        }
        // Swap in a counting sink via a fresh controller sharing the same driver.
        let driver = Arc::new(SimDriver::default());
        let handle = Arc::new(DroneHandle::new(driver));
        let sink = Arc::new(Counting(AtomicUsize::new(0)));
        let controller = MissionController::new(handle, sink.clone(), &crate::config::MissionConfig::default());
        controller.emit_status("hello");
        controller.emit_status("hello");
        assert_eq!(sink.0.load(Ordering::SeqCst), 1, "identical message within the dedup window must be suppressed");
        let _ = controller;
    }
}
