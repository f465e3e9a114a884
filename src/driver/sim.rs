//! A deterministic in-memory [`DroneDriver`] for tests and local demos: no
//! socket, no hardware. Pad IDs are driven from a pre-programmed feed so
//! mission-controller tests can script flaky detection (§8 scenario 5).

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{check_move, check_rc, check_rotate, check_set_height, DriverError, DroneDriver, FrameRead};
use crate::types::drone_status::Position;
use crate::types::frame::CameraNative;
use crate::types::Frame;

struct FixedFrame(Mutex<Option<Frame<CameraNative>>>);

#[async_trait]
impl FrameRead for FixedFrame {
    async fn latest(&self) -> Option<Frame<CameraNative>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// A scripted pad-id feed: each call to `mission_pad_id()` advances one
/// step through a fixed sequence, then holds on the last value.
pub struct SimDriver {
    connected: AtomicBool,
    flying: AtomicBool,
    battery: AtomicI64,
    temperature: AtomicI64,
    height_cm: AtomicI64,
    wifi_signal: AtomicI64,
    flight_time_s: AtomicI64,
    pad_feed: Mutex<Vec<i32>>,
    pad_cursor: AtomicI32,
    frame: Arc<FixedFrame>,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new(vec![-1])
    }
}

impl SimDriver {
    pub fn new(pad_feed: Vec<i32>) -> Self {
        Self {
            connected: AtomicBool::new(false),
            flying: AtomicBool::new(false),
            battery: AtomicI64::new(100),
            temperature: AtomicI64::new(25),
            height_cm: AtomicI64::new(0),
            wifi_signal: AtomicI64::new(90),
            flight_time_s: AtomicI64::new(0),
            pad_feed: Mutex::new(pad_feed),
            pad_cursor: AtomicI32::new(0),
            frame: Arc::new(FixedFrame(Mutex::new(None))),
        }
    }

    pub fn set_frame(&self, frame: Frame<CameraNative>) {
        *self.frame.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
    }

    pub fn push_pad_reading(&self, pad_id: i32) {
        self.pad_feed.lock().unwrap_or_else(|e| e.into_inner()).push(pad_id);
    }
}

#[async_trait]
impl DroneDriver for SimDriver {
    async fn connect(&self) -> Result<(), DriverError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn end(&self) -> Result<(), DriverError> {
        self.connected.store(false, Ordering::SeqCst);
        self.flying.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn battery(&self) -> Result<i64, DriverError> {
        self.require_connected()?;
        Ok(self.battery.load(Ordering::SeqCst))
    }

    async fn temperature(&self) -> Result<i64, DriverError> {
        self.require_connected()?;
        Ok(self.temperature.load(Ordering::SeqCst))
    }

    async fn height(&self) -> Result<i64, DriverError> {
        self.require_connected()?;
        Ok(self.height_cm.load(Ordering::SeqCst))
    }

    async fn mission_pad_id(&self) -> Result<i32, DriverError> {
        self.require_connected()?;
        let feed = self.pad_feed.lock().unwrap_or_else(|e| e.into_inner());
        if feed.is_empty() {
            return Ok(-1);
        }
        let idx = self.pad_cursor.load(Ordering::SeqCst) as usize;
        let value = feed[idx.min(feed.len() - 1)];
        if idx < feed.len() - 1 {
            self.pad_cursor.fetch_add(1, Ordering::SeqCst);
        }
        Ok(value)
    }

    async fn wifi_signal(&self) -> Result<i64, DriverError> {
        self.require_connected()?;
        Ok(self.wifi_signal.load(Ordering::SeqCst))
    }

    async fn flight_time(&self) -> Result<i64, DriverError> {
        self.require_connected()?;
        Ok(self.flight_time_s.load(Ordering::SeqCst))
    }

    async fn position(&self) -> Result<Position, DriverError> {
        self.require_connected()?;
        Ok(Position {
            x: 0.0,
            y: 0.0,
            z: self.height_cm.load(Ordering::SeqCst) as f64,
        })
    }

    fn is_flying(&self) -> bool {
        self.flying.load(Ordering::SeqCst)
    }

    async fn takeoff(&self) -> Result<(), DriverError> {
        self.require_connected()?;
        self.flying.store(true, Ordering::SeqCst);
        self.height_cm.store(100, Ordering::SeqCst);
        Ok(())
    }

    async fn land(&self) -> Result<(), DriverError> {
        self.require_connected()?;
        self.flying.store(false, Ordering::SeqCst);
        self.height_cm.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn emergency(&self) -> Result<(), DriverError> {
        self.flying.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn move_forward(&self, cm: i32) -> Result<(), DriverError> {
        check_move(cm)?;
        self.require_flying()
    }
    async fn move_back(&self, cm: i32) -> Result<(), DriverError> {
        check_move(cm)?;
        self.require_flying()
    }
    async fn move_left(&self, cm: i32) -> Result<(), DriverError> {
        check_move(cm)?;
        self.require_flying()
    }
    async fn move_right(&self, cm: i32) -> Result<(), DriverError> {
        check_move(cm)?;
        self.require_flying()
    }
    async fn move_up(&self, cm: i32) -> Result<(), DriverError> {
        check_move(cm)?;
        self.require_flying()
    }
    async fn move_down(&self, cm: i32) -> Result<(), DriverError> {
        check_move(cm)?;
        self.require_flying()
    }

    async fn rotate_clockwise(&self, deg: i32) -> Result<(), DriverError> {
        check_rotate(deg)?;
        self.require_flying()
    }
    async fn rotate_counter_clockwise(&self, deg: i32) -> Result<(), DriverError> {
        check_rotate(deg)?;
        self.require_flying()
    }

    async fn set_height(&self, cm: i32) -> Result<(), DriverError> {
        check_set_height(cm)?;
        self.require_flying()?;
        self.height_cm.store(cm as i64, Ordering::SeqCst);
        Ok(())
    }

    async fn send_rc_control(&self, lr: i32, fb: i32, ud: i32, yaw: i32) -> Result<(), DriverError> {
        check_rc(lr)?;
        check_rc(fb)?;
        check_rc(ud)?;
        check_rc(yaw)?;
        self.require_flying()
    }

    async fn go_xyz_speed_mid(&self, _x: i32, _y: i32, _z: i32, speed: i32, _pad_id: i32) -> Result<(), DriverError> {
        bounded_speed(speed)?;
        self.require_flying()
    }

    async fn streamon(&self) -> Result<(), DriverError> {
        self.require_connected()
    }

    async fn streamoff(&self) -> Result<(), DriverError> {
        self.require_connected()
    }

    async fn get_frame_read(&self) -> Result<Arc<dyn FrameRead>, DriverError> {
        self.require_connected()?;
        Ok(self.frame.clone())
    }
}

impl SimDriver {
    fn require_connected(&self) -> Result<(), DriverError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(DriverError::NotConnected)
        }
    }

    fn require_flying(&self) -> Result<(), DriverError> {
        self.require_connected()?;
        if self.is_flying() {
            Ok(())
        } else {
            Err(DriverError::Rejected("drone is not flying".to_string()))
        }
    }
}

fn bounded_speed(speed: i32) -> Result<(), DriverError> {
    if (1..=100).contains(&speed) {
        Ok(())
    } else {
        Err(DriverError::OutOfRange {
            name: "speed",
            value: speed as i64,
            min: 1,
            max: 100,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_commands_before_connect() {
        let sim = SimDriver::default();
        assert!(matches!(sim.battery().await, Err(DriverError::NotConnected)));
    }

    #[tokio::test]
    async fn pad_feed_advances_then_holds() {
        let sim = SimDriver::new(vec![-1, 1, 1, 6]);
        sim.connect().await.unwrap();
        assert_eq!(sim.mission_pad_id().await.unwrap(), -1);
        assert_eq!(sim.mission_pad_id().await.unwrap(), 1);
        assert_eq!(sim.mission_pad_id().await.unwrap(), 1);
        assert_eq!(sim.mission_pad_id().await.unwrap(), 6);
        assert_eq!(sim.mission_pad_id().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn takeoff_then_move_succeeds() {
        let sim = SimDriver::default();
        sim.connect().await.unwrap();
        sim.takeoff().await.unwrap();
        assert!(sim.move_forward(50).await.is_ok());
        assert!(matches!(sim.move_forward(10).await, Err(DriverError::OutOfRange { .. })));
    }
}
