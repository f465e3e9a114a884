//! Remote segmentation service client (C4): availability probe, retrying
//! `segment` call, bounded concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{ImageOutputFormat, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("request to segmentation service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("segmentation service returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl SegmentationError {
    /// 4xx is terminal; anything else (5xx, network, timeout) is retryable.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status >= 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationResult {
    pub success: bool,
    pub mask_base64: String,
    pub description: String,
    pub error: Option<String>,
    pub elapsed_seconds: f64,
    pub metadata: BTreeMap<String, String>,
}

impl SegmentationResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            mask_base64: String::new(),
            description: String::new(),
            error: Some(error.into()),
            elapsed_seconds: 0.0,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Serialize)]
struct SegmentRequest<'a> {
    #[serde(rename = "imageBase64")]
    image_base64: String,
    query: &'a str,
    sample_frames: u32,
}

#[derive(Deserialize)]
struct SegmentResponse {
    mask: String,
    #[serde(default)]
    description: String,
}

pub struct SegmentationClient {
    http: reqwest::Client,
    endpoint: String,
    health_url: String,
    health_ttl: Duration,
    max_retries: u32,
    semaphore: Arc<Semaphore>,
    last_check: std::sync::Mutex<Option<Instant>>,
    last_available: AtomicBool,
    requests_sent: AtomicU64,
}

impl SegmentationClient {
    pub fn new(cfg: &crate::config::SegmentationConfig) -> Self {
        let base = cfg
            .endpoint
            .rsplit_once('/')
            .map(|(base, _)| base.to_string())
            .unwrap_or_else(|| cfg.endpoint.clone());
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(cfg.http_timeout_secs))
                .build()
                .expect("reqwest client builds with static config"),
            endpoint: cfg.endpoint.clone(),
            health_url: format!("{base}{}", cfg.health_path),
            health_ttl: Duration::from_secs(cfg.health_ttl_secs),
            max_retries: cfg.max_retries,
            semaphore: Arc::new(Semaphore::new(cfg.concurrency_limit)),
            last_check: std::sync::Mutex::new(None),
            last_available: AtomicBool::new(false),
            requests_sent: AtomicU64::new(0),
        }
    }

    /// Cached with the configured TTL; a health probe treats any response
    /// (even 404/405) from the origin as "process alive".
    pub async fn is_available(&self) -> bool {
        self.is_available_inner(false).await
    }

    pub async fn is_available_forced(&self) -> bool {
        self.is_available_inner(true).await
    }

    async fn is_available_inner(&self, force: bool) -> bool {
        if !force {
            let cached = {
                let guard = self.last_check.lock().unwrap_or_else(|e| e.into_inner());
                guard.filter(|t| t.elapsed() < self.health_ttl)
            };
            if cached.is_some() {
                return self.last_available.load(Ordering::Relaxed);
            }
        }

        let available = self.http.get(&self.health_url).send().await.is_ok();
        *self.last_check.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.last_available.store(available, Ordering::Relaxed);
        if available {
            info!("segmentation service is available");
        } else {
            warn!("segmentation service health probe failed");
        }
        available
    }

    /// Remote attempt chain only — no local fallback. Callers combine this
    /// with [`crate::segmentation::fallback`] per the service-level policy.
    pub async fn segment_remote(
        &self,
        image: &RgbImage,
        query: &str,
        sample_frames: u32,
    ) -> Result<SegmentationResult, SegmentationError> {
        let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
        let started = Instant::now();

        let mut buf = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buf), ImageOutputFormat::Jpeg(90))
            .expect("in-memory JPEG encode cannot fail");
        let image_base64 = format!("data:image/jpeg;base64,{}", BASE64.encode(buf));

        let body = SegmentRequest {
            image_base64,
            query,
            sample_frames,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.requests_sent.fetch_add(1, Ordering::Relaxed);
            let outcome = self.try_once(&body).await;
            match outcome {
                Ok(result) => return Ok(result.with_elapsed(started.elapsed())),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = Duration::from_secs(2u64.pow(attempt - 1));
                    warn!(attempt, delay_secs = delay.as_secs(), error = %e, "retrying segmentation request");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_once(&self, body: &SegmentRequest<'_>) -> Result<SegmentationResult, SegmentationError> {
        let resp = self.http.post(&self.endpoint).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(SegmentationError::Status {
                status: status.as_u16(),
                body: body_text,
            });
        }
        let parsed: SegmentResponse = resp.json().await?;
        Ok(SegmentationResult {
            success: true,
            mask_base64: parsed.mask,
            description: parsed.description,
            error: None,
            elapsed_seconds: 0.0,
            metadata: BTreeMap::new(),
        })
    }

    pub async fn batch_segment(
        &self,
        tasks: Vec<(RgbImage, String, u32)>,
    ) -> Vec<Result<SegmentationResult, SegmentationError>> {
        let futures = tasks
            .into_iter()
            .map(|(image, query, sample_frames)| async move {
                self.segment_remote(&image, &query, sample_frames).await
            });
        futures::future::join_all(futures).await
    }
}

impl SegmentationResult {
    fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_seconds = elapsed.as_secs_f64();
        self
    }
}

pub(crate) fn failure_result(error: impl Into<String>) -> SegmentationResult {
    SegmentationResult::failure(error)
}
