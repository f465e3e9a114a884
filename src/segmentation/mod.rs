//! Segmentation Client with Fallback (C4).

pub mod client;
pub mod fallback;

use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{ImageOutputFormat, RgbImage};
use tracing::{info, warn};

pub use client::{SegmentationClient, SegmentationError, SegmentationResult};

/// Combines the remote client and the local HSV fallback per the policy in
/// the design: try remote when available, fall back on failure or when the
/// remote is known-down, and surface the remote's error (not the
/// fallback's) if both fail.
pub struct SegmentationService {
    client: SegmentationClient,
    enable_fallback: bool,
}

impl SegmentationService {
    pub fn new(cfg: &crate::config::SegmentationConfig) -> Self {
        Self {
            client: SegmentationClient::new(cfg),
            enable_fallback: cfg.enable_fallback,
        }
    }

    pub async fn is_available(&self) -> bool {
        self.client.is_available().await
    }

    pub async fn segment(
        &self,
        image: &RgbImage,
        query: &str,
        sample_frames: u32,
    ) -> SegmentationResult {
        let available = self.client.is_available().await;

        if available {
            match self.client.segment_remote(image, query, sample_frames).await {
                Ok(result) => return result,
                Err(remote_err) => {
                    warn!(error = %remote_err, "remote segmentation call failed");
                    if self.enable_fallback {
                        return self.local_fallback(image, query, Some(remote_err.to_string()));
                    }
                    return client::failure_result(remote_err.to_string());
                }
            }
        }

        if self.enable_fallback {
            info!("segmentation service unavailable, using local fallback");
            return self.local_fallback(image, query, None);
        }

        client::failure_result("segmentation service unavailable and fallback disabled")
    }

    /// `remote_error`, if present, takes precedence over any local failure —
    /// a failed remote attempt followed by a failed fallback surfaces the
    /// remote error.
    fn local_fallback(&self, image: &RgbImage, query: &str, remote_error: Option<String>) -> SegmentationResult {
        let started = Instant::now();
        let mask = fallback::segment_by_color(image, query);

        let mut buf = Vec::new();
        let encoded = mask
            .clone()
            .write_to(&mut std::io::Cursor::new(&mut buf), ImageOutputFormat::Png)
            .is_ok();

        if !encoded {
            return client::failure_result(remote_error.unwrap_or_else(|| "local fallback encode failed".to_string()));
        }

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("method".to_string(), "local_fallback".to_string());
        metadata.insert("query".to_string(), query.to_string());

        SegmentationResult {
            success: true,
            mask_base64: format!("data:image/png;base64,{}", BASE64.encode(buf)),
            description: format!("local segmentation result: {query}"),
            error: remote_error,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_fallback_tags_metadata() {
        let cfg = crate::config::SegmentationConfig::default();
        let service = SegmentationService::new(&cfg);
        let image = RgbImage::new(4, 4);
        let result = service.local_fallback(&image, "strawberry", None);
        assert!(result.success);
        assert_eq!(result.metadata.get("method"), Some(&"local_fallback".to_string()));
    }
}
