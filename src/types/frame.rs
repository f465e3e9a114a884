//! The frame type and its channel-order invariant.
//!
//! The source system relies on naming convention ("bgr_frame", "rgb_frame")
//! to keep camera-native and inference-native channel order straight. Here
//! the order is a type parameter: a `Frame<CameraNative>` and a
//! `Frame<InferenceNative>` are different types, and the only way to go
//! from one to the other is through [`Frame::to_inference_native`] /
//! [`Frame::to_client_native`], which actually swap the channel bytes.
//! Misuse is a compile error, not a runtime bug.

use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

/// A channel ordering a [`Frame`] can be tagged with.
pub trait ChannelOrder: sealed::Sealed + Send + Sync + 'static {
    const NAME: &'static str;
}

/// (B, G, R) — the order the drone's camera hands frames to the pipeline in.
#[derive(Debug, Clone, Copy)]
pub struct CameraNative;
/// (R, G, B) — the order vision models expect.
#[derive(Debug, Clone, Copy)]
pub struct InferenceNative;
/// (R, G, B) — the order delivered to client viewers (same byte order as
/// inference-native, but kept as a distinct type so a client-bound frame can
/// never accidentally be fed back into a detector).
#[derive(Debug, Clone, Copy)]
pub struct ClientNative;

impl sealed::Sealed for CameraNative {}
impl sealed::Sealed for InferenceNative {}
impl sealed::Sealed for ClientNative {}

impl ChannelOrder for CameraNative {
    const NAME: &'static str = "camera-native (BGR)";
}
impl ChannelOrder for InferenceNative {
    const NAME: &'static str = "inference-native (RGB)";
}
impl ChannelOrder for ClientNative {
    const NAME: &'static str = "client-native (RGB)";
}

/// An immutable pixel buffer tagged with capture timestamp, sequence number
/// and channel order.
#[derive(Debug, Clone)]
pub struct Frame<C: ChannelOrder> {
    pub width: u32,
    pub height: u32,
    /// Packed 3-channel pixel data in `C`'s order, row-major, no padding.
    pub data: Vec<u8>,
    pub seq: u64,
    pub captured_at: std::time::Instant,
    _order: PhantomData<C>,
}

impl<C: ChannelOrder> Frame<C> {
    pub fn new(width: u32, height: u32, data: Vec<u8>, seq: u64) -> Self {
        debug_assert_eq!(data.len(), (width * height * 3) as usize, "frame buffer size mismatch");
        Self {
            width,
            height,
            data,
            seq,
            captured_at: std::time::Instant::now(),
            _order: PhantomData,
        }
    }

    fn swap_channels(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        for px in out.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        out
    }

    /// Extract a sub-region, clipped to frame bounds. Used by the marker
    /// detector to crop to a scan region before decoding.
    pub fn crop(&self, rect: super::geometry::Rect) -> Self {
        let clipped = rect.clipped_to(self.width as i32, self.height as i32);
        let (x, y, w, h) = (
            clipped.x as u32,
            clipped.y as u32,
            clipped.w as u32,
            clipped.h as u32,
        );
        let mut out = Vec::with_capacity((w * h * 3) as usize);
        for row in y..y + h {
            let start = ((row * self.width + x) * 3) as usize;
            let end = start + (w * 3) as usize;
            out.extend_from_slice(&self.data[start..end]);
        }
        Self {
            width: w,
            height: h,
            data: out,
            seq: self.seq,
            captured_at: self.captured_at,
            _order: PhantomData,
        }
    }

    /// Encode as a `image::RgbImage` for drawing/annotation helpers.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
            .expect("frame buffer size already validated at construction")
    }

    pub fn from_rgb_image(img: &image::RgbImage, seq: u64) -> Self {
        Self::new(img.width(), img.height(), img.as_raw().clone(), seq)
    }
}

impl Frame<CameraNative> {
    /// Swap B/R to produce the order inference models expect. Called
    /// immediately before handing a frame to a detector, never earlier.
    pub fn to_inference_native(&self) -> Frame<InferenceNative> {
        Frame {
            width: self.width,
            height: self.height,
            data: self.swap_channels(),
            seq: self.seq,
            captured_at: self.captured_at,
            _order: PhantomData,
        }
    }

    /// Swap B/R to produce the order delivered to clients. Called
    /// immediately before JPEG encoding, never earlier.
    pub fn to_client_native(&self) -> Frame<ClientNative> {
        Frame {
            width: self.width,
            height: self.height,
            data: self.swap_channels(),
            seq: self.seq,
            captured_at: self.captured_at,
            _order: PhantomData,
        }
    }
}

impl Frame<InferenceNative> {
    /// Back to camera-native, e.g. after a detector draws annotations on the
    /// inference-native copy and needs to hand it back into the pipeline.
    pub fn to_camera_native(&self) -> Frame<CameraNative> {
        Frame {
            width: self.width,
            height: self.height,
            data: self.swap_channels(),
            seq: self.seq,
            captured_at: self.captured_at,
            _order: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_bytes() {
        let frame = Frame::<CameraNative>::new(1, 1, vec![10, 20, 30], 0);
        let back = frame.to_inference_native().to_camera_native();
        assert_eq!(back.data, frame.data);
    }

    #[test]
    fn conversion_actually_swaps_bytes() {
        let frame = Frame::<CameraNative>::new(1, 1, vec![10, 20, 30], 0);
        let inference = frame.to_inference_native();
        assert_eq!(inference.data, vec![30, 20, 10]);
    }
}
