//! Uniform "analyze image+prompt → text" contract (C5) over three wire
//! dialects. The adapter is stateless per call; callers pass the config
//! snapshot as an argument.

use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

use super::config::{Provider, VlmConfig};

#[derive(Debug, Error, Clone)]
pub enum VlmError {
    #[error("unauthorized: check the API key")]
    Unauthorized,
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("network error or timeout: {0}")]
    NetworkTimeout(String),
    #[error("unknown provider error: {0}")]
    Unknown(String),
}

impl VlmError {
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::ModelNotFound(body.to_string()),
            429 => Self::QuotaExceeded,
            408 | 504 => Self::NetworkTimeout(body.to_string()),
            _ => Self::Unknown(format!("http {status}: {body}")),
        }
    }
}

const MASK_PROMPT_INSTRUCTION: &str =
    "In 10 to 20 characters, describe only the most likely diseased region's visual location. Do not name a disease.";

const DIAGNOSIS_TEMPLATE_INSTRUCTION: &str = "\
Produce a Markdown report with exactly these sections, in order: \
## Summary, ## Disease identification, ## Severity (level, confidence%, scope), \
## Detailed analysis (features, causes, trajectory), \
## Recommended actions (immediate, follow-up), ## Preventive measures.";

/// A single wire dialect's request/response shape. Implementors hide their
/// own JSON schema behind this.
#[async_trait]
pub trait VlmDialect: Send + Sync {
    async fn generate_mask_prompt(&self, cfg: &VlmConfig, image: &RgbImage) -> Result<String, VlmError>;

    #[allow(clippy::too_many_arguments)]
    async fn diagnose(
        &self,
        cfg: &VlmConfig,
        plant_id: i64,
        image: &RgbImage,
        mask_image: Option<&str>,
        mask_description: Option<&str>,
        mask_prompt: Option<&str>,
    ) -> Result<String, VlmError>;
}

/// Dispatches on `cfg.provider` and presents a single interface upward.
pub struct VlmAdapter {
    openai_compatible: Box<dyn VlmDialect>,
    anthropic: Box<dyn VlmDialect>,
    google: Box<dyn VlmDialect>,
}

impl VlmAdapter {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            openai_compatible: Box::new(super::providers::openai::OpenAiCompatibleDialect::new(http.clone())),
            anthropic: Box::new(super::providers::anthropic::AnthropicDialect::new(http.clone())),
            google: Box::new(super::providers::google::GoogleDialect::new(http)),
        }
    }

    fn dialect_for(&self, provider: Provider) -> &dyn VlmDialect {
        match provider {
            Provider::Openai | Provider::Ollama | Provider::Qwen | Provider::Dashscope => {
                self.openai_compatible.as_ref()
            }
            Provider::Anthropic => self.anthropic.as_ref(),
            Provider::Google => self.google.as_ref(),
        }
    }

    pub async fn generate_mask_prompt(&self, cfg: &VlmConfig, image: &RgbImage) -> Result<String, VlmError> {
        self.dialect_for(cfg.provider).generate_mask_prompt(cfg, image).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn diagnose(
        &self,
        cfg: &VlmConfig,
        plant_id: i64,
        image: &RgbImage,
        mask_image: Option<&str>,
        mask_description: Option<&str>,
        mask_prompt: Option<&str>,
    ) -> Result<String, VlmError> {
        self.dialect_for(cfg.provider)
            .diagnose(cfg, plant_id, image, mask_image, mask_description, mask_prompt)
            .await
    }
}

pub(super) fn mask_prompt_instruction() -> &'static str {
    MASK_PROMPT_INSTRUCTION
}

pub(super) fn diagnosis_instruction() -> &'static str {
    DIAGNOSIS_TEMPLATE_INSTRUCTION
}
