//! Pluggable visual detectors (C2, C3).

pub mod marker;
pub mod object;

pub use marker::{DetectOptions, MarkerDetector, MarkerDecoder, NoOpMarkerDecoder, ScanRegion, ValidationRules};
pub use object::{NoModelLoaded, ObjectDetector, ObjectInference};
