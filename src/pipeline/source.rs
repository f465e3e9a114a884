//! Frame source: pulls the latest frame from the driver's frame-read
//! handle, tagging it with a strictly-increasing pipeline sequence number.
//! "Latest" is inherently drop-oldest — if the driver is falling behind,
//! an unconsumed intermediate frame is simply never returned.

use std::sync::Arc;

use crate::driver::FrameRead;
use crate::types::frame::CameraNative;
use crate::types::Frame;

pub struct FrameSource {
    read: Arc<dyn FrameRead>,
    next_seq: u64,
}

impl FrameSource {
    pub fn new(read: Arc<dyn FrameRead>) -> Self {
        Self { read, next_seq: 0 }
    }

    /// Returns the latest frame available, re-stamped with the next
    /// pipeline sequence number, or `None` if the driver has nothing yet.
    pub async fn next_frame(&mut self) -> Option<Frame<CameraNative>> {
        let frame = self.read.latest().await?;
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(Frame::new(frame.width, frame.height, frame.data, seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Fixed(Mutex<Option<Frame<CameraNative>>>);
    #[async_trait]
    impl FrameRead for Fixed {
        async fn latest(&self) -> Option<Frame<CameraNative>> {
            self.0.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn sequence_numbers_strictly_increase() {
        let frame = Frame::<CameraNative>::new(2, 2, vec![0u8; 12], 0);
        let read = Arc::new(Fixed(Mutex::new(Some(frame))));
        let mut source = FrameSource::new(read);
        let a = source.next_frame().await.unwrap();
        let b = source.next_frame().await.unwrap();
        assert!(b.seq > a.seq);
    }

    #[tokio::test]
    async fn no_frame_yet_returns_none() {
        let read = Arc::new(Fixed(Mutex::new(None)));
        let mut source = FrameSource::new(read);
        assert!(source.next_frame().await.is_none());
    }
}
