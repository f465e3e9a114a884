//! Google-style generative dialect — inline image data alongside text parts.

use async_trait::async_trait;
use image::RgbImage;
use serde_json::json;

use crate::vlm::config::VlmConfig;
use crate::vlm::provider::{diagnosis_instruction, mask_prompt_instruction, VlmDialect, VlmError};

const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GoogleDialect {
    http: reqwest::Client,
}

impl GoogleDialect {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn generate_content(&self, cfg: &VlmConfig, parts: serde_json::Value) -> Result<String, VlmError> {
        let base = cfg.api_base.as_deref().unwrap_or(DEFAULT_BASE);
        let key = cfg.api_key.as_deref().unwrap_or("");
        let url = format!("{base}/{}:generateContent?key={key}", cfg.model);
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "temperature": cfg.temperature,
                "maxOutputTokens": cfg.max_tokens,
            },
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VlmError::NetworkTimeout(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VlmError::from_status(status.as_u16(), &body));
        }

        let parsed: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| VlmError::Unknown(e.to_string()))?;
        parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VlmError::Unknown("missing candidates[0].content.parts[0].text".to_string()))
    }

    fn inline_image(image: &RgbImage) -> serde_json::Value {
        json!({ "inline_data": { "mime_type": "image/jpeg", "data": super::to_jpeg_base64(image) } })
    }
}

#[async_trait]
impl VlmDialect for GoogleDialect {
    async fn generate_mask_prompt(&self, cfg: &VlmConfig, image: &RgbImage) -> Result<String, VlmError> {
        let parts = json!([{ "text": mask_prompt_instruction() }, Self::inline_image(image)]);
        self.generate_content(cfg, parts).await
    }

    async fn diagnose(
        &self,
        cfg: &VlmConfig,
        plant_id: i64,
        image: &RgbImage,
        _mask_image: Option<&str>,
        mask_description: Option<&str>,
        mask_prompt: Option<&str>,
    ) -> Result<String, VlmError> {
        let text = format!(
            "{}\nPlant id: {plant_id}\nMask prompt: {}\nMask description: {}",
            diagnosis_instruction(),
            mask_prompt.unwrap_or("none"),
            mask_description.unwrap_or("none"),
        );
        let parts = json!([{ "text": text }, Self::inline_image(image)]);
        self.generate_content(cfg, parts).await
    }
}
