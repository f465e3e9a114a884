//! Marker Detector (C2): decode 2-D markers, extract plant-id integers,
//! enforce a per-ID UI-feedback cooldown distinct from the diagnosis
//! cooldown in C6.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use regex::Regex;

use crate::types::{CooldownEntry, Frame, InferenceNative, MarkerObservation, Point, Quad, Rect};
use crate::types::frame::CameraNative;

const COOLING_COLOR: Rgb<u8> = Rgb([160, 160, 160]);
const INVALID_COLOR: Rgb<u8> = Rgb([220, 30, 30]);
const VALID_COLOR: Rgb<u8> = Rgb([30, 200, 60]);

/// A raw decode from the pluggable marker-decoding backend, in the
/// coordinate space of whatever crop it was given.
#[derive(Debug, Clone)]
pub struct RawMarkerDecode {
    pub text: String,
    pub bbox: Rect,
    pub corners: Option<Quad>,
}

/// The marker-decoding inference itself is out of scope — implementations
/// plug in a concrete 2-D code reader here. A decoder with nothing to
/// decode is a legal no-op.
pub trait MarkerDecoder: Send + Sync {
    fn decode(&self, frame: &Frame<InferenceNative>) -> Vec<RawMarkerDecode>;
}

pub struct NoOpMarkerDecoder;
impl MarkerDecoder for NoOpMarkerDecoder {
    fn decode(&self, _frame: &Frame<InferenceNative>) -> Vec<RawMarkerDecode> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ScanRegion {
    Full,
    Center,
    Top,
    Bottom,
    Custom(Rect),
}

impl ScanRegion {
    fn rect_for(self, width: i32, height: i32) -> Rect {
        match self {
            Self::Full => Rect::new(0, 0, width, height),
            Self::Center => Rect::new(width / 4, height / 4, width / 2, height / 2),
            Self::Top => Rect::new(0, 0, width, height / 2),
            Self::Bottom => Rect::new(0, height / 2, width, height / 2),
            Self::Custom(r) => r,
        }
        .clipped_to(width, height)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    pub pattern: Option<Regex>,
    pub required_prefix: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl ValidationRules {
    fn validate(&self, text: &str) -> bool {
        if let Some(prefix) = &self.required_prefix {
            if !text.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(min) = self.min_length {
            if text.len() < min {
                return false;
            }
        }
        if let Some(max) = self.max_length {
            if text.len() > max {
                return false;
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(text) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetectOptions {
    pub scan_region: Option<ScanRegion>,
    pub allow_multi: bool,
    pub max_results: Option<usize>,
    pub validation: Option<ValidationRules>,
}

pub struct MarkerDetector {
    decoder: Arc<dyn MarkerDecoder>,
    id_pattern: Regex,
    cooldown: Mutex<HashMap<i64, CooldownEntry>>,
    cooldown_duration: Mutex<Duration>,
}

impl MarkerDetector {
    pub fn new(decoder: Arc<dyn MarkerDecoder>, cooldown_duration: Duration) -> Self {
        Self {
            decoder,
            // `(plant|植株|ID)[-_:]?<digits>` — prefix pattern before the
            // pure-integer fallback.
            id_pattern: Regex::new(r"(?i)(plant|植株|id)[-_:]?(\d+)")
                .expect("static marker id pattern is valid"),
            cooldown: Mutex::new(HashMap::new()),
            cooldown_duration: Mutex::new(cooldown_duration),
        }
    }

    pub fn set_cooldown(&self, duration: Duration) {
        *self.cooldown_duration.lock().unwrap_or_else(|e| e.into_inner()) = duration;
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown_duration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_secs()
    }

    pub fn clear_cooldowns(&self) {
        self.cooldown.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn active_cooldowns(&self) -> Vec<i64> {
        let now_gate = self.cooldown.lock().unwrap_or_else(|e| e.into_inner());
        now_gate
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(id, _)| *id)
            .collect()
    }

    fn extract_plant_id(&self, text: &str) -> Option<i64> {
        if let Some(caps) = self.id_pattern.captures(text) {
            if let Some(m) = caps.get(2) {
                if let Ok(id) = m.as_str().parse::<i64>() {
                    return Some(id);
                }
            }
        }
        text.trim().parse::<i64>().ok()
    }

    fn preprocess(frame: &Frame<InferenceNative>) -> Frame<InferenceNative> {
        let rgb = frame.to_rgb_image();
        let gray = image::imageops::grayscale(&rgb);
        let equalized = imageproc::contrast::equalize_histogram(&gray);
        let blurred = imageproc::filter::median_filter(&equalized, 2, 2);
        let thresholded = imageproc::contrast::adaptive_threshold(&blurred, 15);
        let rgb_again = image::DynamicImage::ImageLuma8(thresholded).to_rgb8();
        Frame::from_rgb_image(&rgb_again, frame.seq)
    }

    /// Decode markers in `frame`, apply cooldown/validation, and return an
    /// annotated copy plus the eligible (non-cooldown, non-invalid)
    /// observations.
    pub fn detect(
        &self,
        frame: &Frame<CameraNative>,
        opts: &DetectOptions,
    ) -> (Frame<CameraNative>, Vec<MarkerObservation>) {
        let region = opts
            .scan_region
            .unwrap_or(ScanRegion::Full)
            .rect_for(frame.width as i32, frame.height as i32);
        let crop = frame.crop(region);
        let inference_crop = crop.to_inference_native();

        let mut raw = self.decoder.decode(&inference_crop);
        if raw.is_empty() {
            let preprocessed = Self::preprocess(&inference_crop);
            raw = self.decoder.decode(&preprocessed);
        }

        let mut observations = Vec::new();
        let mut annotated = frame.to_rgb_image();

        for decode in raw {
            let bbox = decode.bbox.offset(region.x, region.y);
            let corners = decode.corners.map(|q| offset_quad(q, region.x, region.y));
            let id = self.extract_plant_id(&decode.text);

            if let Some(rules) = &opts.validation {
                if !rules.validate(&decode.text) {
                    draw_hollow_rect_mut(&mut annotated, to_imageproc_rect(bbox), INVALID_COLOR);
                    continue;
                }
            }

            if let Some(id) = id {
                let mut cooldown = self.cooldown.lock().unwrap_or_else(|e| e.into_inner());
                let cooling = cooldown.get(&id).map_or(false, |e| !e.is_expired());
                if cooling {
                    draw_hollow_rect_mut(&mut annotated, to_imageproc_rect(bbox), COOLING_COLOR);
                    continue;
                }
                let duration = *self.cooldown_duration.lock().unwrap_or_else(|e| e.into_inner());
                cooldown.insert(id, CooldownEntry::starting_now(duration));
                drop(cooldown);
            }

            draw_hollow_rect_mut(&mut annotated, to_imageproc_rect(bbox), VALID_COLOR);
            observations.push(MarkerObservation {
                id,
                bbox,
                corners,
                decoded_text: decode.text,
                seen_at: Some(std::time::Instant::now()),
            });

            if !opts.allow_multi {
                break;
            }
            if let Some(max) = opts.max_results {
                if observations.len() >= max {
                    break;
                }
            }
        }

        (Frame::from_rgb_image(&annotated, frame.seq), observations)
    }
}

fn offset_quad(q: Quad, dx: i32, dy: i32) -> Quad {
    let shift = |p: Point| Point {
        x: p.x + dx as f32,
        y: p.y + dy as f32,
    };
    Quad {
        top_left: shift(q.top_left),
        top_right: shift(q.top_right),
        bottom_right: shift(q.bottom_right),
        bottom_left: shift(q.bottom_left),
    }
}

fn to_imageproc_rect(r: Rect) -> imageproc::rect::Rect {
    imageproc::rect::Rect::at(r.x, r.y).of_size(r.w.max(1) as u32, r.h.max(1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDecoder(Vec<RawMarkerDecode>);
    impl MarkerDecoder for FixedDecoder {
        fn decode(&self, _frame: &Frame<InferenceNative>) -> Vec<RawMarkerDecode> {
            self.0.clone()
        }
    }

    fn blank_frame() -> Frame<CameraNative> {
        Frame::new(64, 64, vec![0u8; 64 * 64 * 3], 0)
    }

    #[test]
    fn extracts_prefixed_plant_id() {
        let detector = MarkerDetector::new(Arc::new(NoOpMarkerDecoder), Duration::from_secs(60));
        assert_eq!(detector.extract_plant_id("plant_42"), Some(42));
        assert_eq!(detector.extract_plant_id("ID:7"), Some(7));
        assert_eq!(detector.extract_plant_id("9"), Some(9));
        assert_eq!(detector.extract_plant_id("no digits here"), None);
    }

    #[test]
    fn cooldown_excludes_repeat_observation() {
        let decoder = Arc::new(FixedDecoder(vec![RawMarkerDecode {
            text: "plant_42".to_string(),
            bbox: Rect::new(1, 1, 10, 10),
            corners: None,
        }]));
        let detector = MarkerDetector::new(decoder, Duration::from_secs(60));
        let frame = blank_frame();
        let opts = DetectOptions::default();

        let (_, first) = detector.detect(&frame, &opts);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, Some(42));

        let (_, second) = detector.detect(&frame, &opts);
        assert!(second.is_empty(), "repeat within cooldown must be excluded");
    }

    #[test]
    fn custom_region_clips_to_frame_bounds() {
        let region = ScanRegion::Custom(Rect::new(-10, -10, 1000, 1000)).rect_for(64, 64);
        assert_eq!(region, Rect::new(0, 0, 64, 64));
    }
}
