//! Drone Driver (§6.2): the consumed interface to the commodity quadrotor's
//! UDP wire protocol. The protocol itself is out of scope — this is the
//! operation set C7/C8/C9 are written against, plus a deterministic
//! in-memory implementation for tests and demos.
//!
//! The driver is a single exclusive resource (§5): every caller reaches it
//! through [`DroneHandle`], which serializes access behind a mutex so a
//! manual-control stick update and a mission burst can never race on the
//! wire.

mod sim;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::types::frame::CameraNative;
use crate::types::Frame;

pub use sim::SimDriver;

#[derive(Debug, Error, Clone)]
pub enum DriverError {
    #[error("drone not connected")]
    NotConnected,
    #[error("drone command rejected: {0}")]
    Rejected(String),
    #[error("drone command timed out")]
    Timeout,
    #[error("parameter {name} out of range: {value} not in {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// A handle to the latest available camera frame. Concrete drivers hand
/// back whatever keeps the newest frame fresh (e.g. a background decode
/// thread writing into a shared slot); the pipeline only ever wants the
/// most recent one and is happy to drop stale frames.
#[async_trait]
pub trait FrameRead: Send + Sync {
    async fn latest(&self) -> Option<Frame<CameraNative>>;
}

/// Operations consumed by the frame pipeline (C7), mission controller (C8)
/// and control plane (C9), each blocking until the drone acknowledges.
/// Implementations talk UDP to the real aircraft; [`SimDriver`] fakes it
/// for tests.
#[async_trait]
pub trait DroneDriver: Send + Sync {
    async fn connect(&self) -> Result<(), DriverError>;
    async fn end(&self) -> Result<(), DriverError>;
    fn is_connected(&self) -> bool;

    async fn battery(&self) -> Result<i64, DriverError>;
    async fn temperature(&self) -> Result<i64, DriverError>;
    async fn height(&self) -> Result<i64, DriverError>;
    async fn mission_pad_id(&self) -> Result<i32, DriverError>;
    async fn wifi_signal(&self) -> Result<i64, DriverError>;
    async fn flight_time(&self) -> Result<i64, DriverError>;
    async fn position(&self) -> Result<crate::types::drone_status::Position, DriverError>;
    fn is_flying(&self) -> bool;

    async fn takeoff(&self) -> Result<(), DriverError>;
    async fn land(&self) -> Result<(), DriverError>;
    async fn emergency(&self) -> Result<(), DriverError>;

    async fn move_forward(&self, cm: i32) -> Result<(), DriverError>;
    async fn move_back(&self, cm: i32) -> Result<(), DriverError>;
    async fn move_left(&self, cm: i32) -> Result<(), DriverError>;
    async fn move_right(&self, cm: i32) -> Result<(), DriverError>;
    async fn move_up(&self, cm: i32) -> Result<(), DriverError>;
    async fn move_down(&self, cm: i32) -> Result<(), DriverError>;

    async fn rotate_clockwise(&self, deg: i32) -> Result<(), DriverError>;
    async fn rotate_counter_clockwise(&self, deg: i32) -> Result<(), DriverError>;

    async fn set_height(&self, cm: i32) -> Result<(), DriverError>;

    async fn send_rc_control(&self, lr: i32, fb: i32, ud: i32, yaw: i32) -> Result<(), DriverError>;

    async fn go_xyz_speed_mid(
        &self,
        x: i32,
        y: i32,
        z: i32,
        speed: i32,
        pad_id: i32,
    ) -> Result<(), DriverError>;

    async fn streamon(&self) -> Result<(), DriverError>;
    async fn streamoff(&self) -> Result<(), DriverError>;
    async fn get_frame_read(&self) -> Result<std::sync::Arc<dyn FrameRead>, DriverError>;
}

fn bounded(name: &'static str, value: i32, min: i32, max: i32) -> Result<(), DriverError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(DriverError::OutOfRange {
            name,
            value: value as i64,
            min: min as i64,
            max: max as i64,
        })
    }
}

pub(crate) fn check_move(cm: i32) -> Result<(), DriverError> {
    bounded("cm", cm, 20, 500)
}

pub(crate) fn check_rotate(deg: i32) -> Result<(), DriverError> {
    bounded("deg", deg, 1, 360)
}

pub(crate) fn check_set_height(cm: i32) -> Result<(), DriverError> {
    bounded("cm", cm, 40, 300)
}

pub(crate) fn check_rc(value: i32) -> Result<(), DriverError> {
    bounded("rc", value, -100, 100)
}

/// Serializes access to a shared [`DroneDriver`] so concurrent callers
/// (status polling, manual control, mission bursts, direct commands) never
/// race on the wire (§5: "the drone driver is a single exclusive
/// resource").
pub struct DroneHandle {
    driver: std::sync::Arc<dyn DroneDriver>,
    lock: Mutex<()>,
}

impl DroneHandle {
    pub fn new(driver: std::sync::Arc<dyn DroneDriver>) -> Self {
        Self {
            driver,
            lock: Mutex::new(()),
        }
    }

    pub fn driver(&self) -> &dyn DroneDriver {
        self.driver.as_ref()
    }

    /// Run a closure while holding exclusive access to the driver. Use for
    /// anything that issues more than one command and must not be
    /// interleaved with another caller (e.g. a mission's rotate-then-poll).
    pub async fn exclusive<F, R>(&self, f: F) -> R
    where
        F: for<'a> FnOnce(&'a dyn DroneDriver) -> std::pin::Pin<Box<dyn std::future::Future<Output = R> + Send + 'a>>,
    {
        let _guard = self.lock.lock().await;
        f(self.driver.as_ref()).await
    }
}
