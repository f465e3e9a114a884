//! Local HSV color-threshold segmentation (C4), used when the remote mask
//! service is unavailable or its attempt chain fails.

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};

/// An inclusive OpenCV-scale HSV range: H in 0..=180, S/V in 0..=255.
#[derive(Clone, Copy)]
struct HsvRange {
    lo: (u16, u8, u8),
    hi: (u16, u8, u8),
}

const RED_LOW: HsvRange = HsvRange {
    lo: (0, 100, 100),
    hi: (10, 255, 255),
};
const RED_HIGH: HsvRange = HsvRange {
    lo: (160, 100, 100),
    hi: (180, 255, 255),
};
const GREEN: HsvRange = HsvRange {
    lo: (40, 40, 40),
    hi: (80, 255, 255),
};
const BLUE: HsvRange = HsvRange {
    lo: (100, 100, 100),
    hi: (130, 255, 255),
};
const YELLOW: HsvRange = HsvRange {
    lo: (20, 100, 100),
    hi: (40, 255, 255),
};
const WHITE: HsvRange = HsvRange {
    lo: (0, 0, 200),
    hi: (180, 30, 255),
};
const BLACK: HsvRange = HsvRange {
    lo: (0, 0, 0),
    hi: (180, 255, 50),
};
const DEFAULT_RANGE: HsvRange = HsvRange {
    lo: (0, 30, 30),
    hi: (180, 255, 255),
};

#[derive(Clone, Copy)]
enum ColorTarget {
    Red,
    Green,
    Blue,
    Yellow,
    White,
    Black,
}

impl ColorTarget {
    fn ranges(self) -> Vec<HsvRange> {
        match self {
            Self::Red => vec![RED_LOW, RED_HIGH],
            Self::Green => vec![GREEN],
            Self::Blue => vec![BLUE],
            Self::Yellow => vec![YELLOW],
            Self::White => vec![WHITE],
            Self::Black => vec![BLACK],
        }
    }
}

/// Object-name → color keyword table (domain-specific, e.g.
/// "strawberry" → red, "leaf" → green, "yellow spot" → yellow).
fn color_for_query(query: &str) -> Vec<HsvRange> {
    let q = query.to_lowercase();
    const OBJECT_COLORS: &[(&str, ColorTarget)] = &[
        ("strawberry", ColorTarget::Red),
        ("fruit", ColorTarget::Red),
        ("leaf", ColorTarget::Green),
        ("leaves", ColorTarget::Green),
        ("yellow spot", ColorTarget::Yellow),
        ("disease", ColorTarget::Yellow),
        ("spot", ColorTarget::Yellow),
    ];
    for (keyword, target) in OBJECT_COLORS {
        if q.contains(keyword) {
            return target.ranges();
        }
    }
    const COLOR_WORDS: &[(&str, ColorTarget)] = &[
        ("red", ColorTarget::Red),
        ("green", ColorTarget::Green),
        ("blue", ColorTarget::Blue),
        ("yellow", ColorTarget::Yellow),
        ("white", ColorTarget::White),
        ("black", ColorTarget::Black),
    ];
    for (keyword, target) in COLOR_WORDS {
        if q.contains(keyword) {
            return target.ranges();
        }
    }
    vec![DEFAULT_RANGE]
}

fn rgb_to_hsv_cv(r: u8, g: u8, b: u8) -> (u16, u8, u8) {
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };
    let v = max;

    ((h / 2.0).round() as u16, (s * 255.0).round() as u8, (v * 255.0).round() as u8)
}

fn in_range(hsv: (u16, u8, u8), range: &HsvRange) -> bool {
    hsv.0 >= range.lo.0
        && hsv.0 <= range.hi.0
        && hsv.1 >= range.lo.1
        && hsv.1 <= range.hi.1
        && hsv.2 >= range.lo.2
        && hsv.2 <= range.hi.2
}

/// Produce a binary mask selecting pixels whose HSV falls in any of
/// `query`'s color ranges, then morphologically close then open with a
/// 5x5-equivalent kernel.
pub fn segment_by_color(image: &RgbImage, query: &str) -> GrayImage {
    let ranges = color_for_query(query);
    let mut mask = GrayImage::new(image.width(), image.height());
    for (pixel, out) in image.pixels().zip(mask.pixels_mut()) {
        let hsv = rgb_to_hsv_cv(pixel[0], pixel[1], pixel[2]);
        let hit = ranges.iter().any(|r| in_range(hsv, r));
        *out = Luma([if hit { 255 } else { 0 }]);
    }

    // 5x5 kernel ≈ chebyshev radius 2. Close (dilate→erode) then open
    // (erode→dilate).
    let closed = erode(&dilate(&mask, Norm::LInf, 2), Norm::LInf, 2);
    dilate(&erode(&closed, Norm::LInf, 2), Norm::LInf, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_query_picks_red_ranges() {
        let ranges = color_for_query("segment the strawberry");
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn unknown_query_falls_back_to_default_range() {
        let ranges = color_for_query("something unrelated");
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn pure_red_pixel_matches_red_range() {
        let hsv = rgb_to_hsv_cv(255, 0, 0);
        assert!(in_range(hsv, &RED_LOW) || in_range(hsv, &RED_HIGH));
    }
}
