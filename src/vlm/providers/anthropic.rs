//! Anthropic-style messages dialect — image as base64 with explicit media
//! type inside a block list.

use async_trait::async_trait;
use image::RgbImage;
use serde_json::json;

use crate::vlm::config::VlmConfig;
use crate::vlm::provider::{diagnosis_instruction, mask_prompt_instruction, VlmDialect, VlmError};

const DEFAULT_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicDialect {
    http: reqwest::Client,
}

impl AnthropicDialect {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn messages(&self, cfg: &VlmConfig, content: serde_json::Value) -> Result<String, VlmError> {
        let base = cfg.api_base.as_deref().unwrap_or(DEFAULT_BASE);
        let url = format!("{base}/messages");
        let body = json!({
            "model": cfg.model,
            "max_tokens": cfg.max_tokens,
            "temperature": cfg.temperature,
            "messages": [{ "role": "user", "content": content }],
        });

        let mut req = self.http.post(&url).header("anthropic-version", ANTHROPIC_VERSION).json(&body);
        if let Some(key) = &cfg.api_key {
            req = req.header("x-api-key", key);
        }

        let resp = req.send().await.map_err(|e| VlmError::NetworkTimeout(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VlmError::from_status(status.as_u16(), &body));
        }

        let parsed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| VlmError::Unknown(e.to_string()))?;
        parsed["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VlmError::Unknown("missing content[0].text".to_string()))
    }

    fn image_block(image: &RgbImage) -> serde_json::Value {
        json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": "image/jpeg",
                "data": super::to_jpeg_base64(image),
            },
        })
    }
}

#[async_trait]
impl VlmDialect for AnthropicDialect {
    async fn generate_mask_prompt(&self, cfg: &VlmConfig, image: &RgbImage) -> Result<String, VlmError> {
        let content = json!([
            Self::image_block(image),
            { "type": "text", "text": mask_prompt_instruction() },
        ]);
        self.messages(cfg, content).await
    }

    async fn diagnose(
        &self,
        cfg: &VlmConfig,
        plant_id: i64,
        image: &RgbImage,
        mask_image: Option<&str>,
        mask_description: Option<&str>,
        mask_prompt: Option<&str>,
    ) -> Result<String, VlmError> {
        let mut blocks = vec![Self::image_block(image)];
        if mask_image.is_some() {
            // Mask images arrive as a base64 data URL from C4; Anthropic
            // wants raw base64 + media type, so strip the prefix.
            if let Some(raw) = mask_image.and_then(|m| m.split(',').nth(1)) {
                blocks.push(json!({
                    "type": "image",
                    "source": { "type": "base64", "media_type": "image/png", "data": raw },
                }));
            }
        }
        blocks.push(json!({
            "type": "text",
            "text": format!(
                "{}\nPlant id: {plant_id}\nMask prompt: {}\nMask description: {}",
                diagnosis_instruction(),
                mask_prompt.unwrap_or("none"),
                mask_description.unwrap_or("none"),
            ),
        }));
        self.messages(cfg, serde_json::Value::Array(blocks)).await
    }
}
