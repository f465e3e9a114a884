//! OpenAI-compatible chat-completions dialect — also spoken by several
//! self-hosted and Chinese-vendor backends (Ollama, Qwen, DashScope).

use async_trait::async_trait;
use image::RgbImage;
use serde_json::json;

use crate::vlm::config::VlmConfig;
use crate::vlm::provider::{diagnosis_instruction, mask_prompt_instruction, VlmDialect, VlmError};

const DEFAULT_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatibleDialect {
    http: reqwest::Client,
}

impl OpenAiCompatibleDialect {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn base_url<'a>(&self, cfg: &'a VlmConfig) -> &'a str {
        cfg.api_base.as_deref().unwrap_or(DEFAULT_BASE)
    }

    async fn chat(&self, cfg: &VlmConfig, content: serde_json::Value) -> Result<String, VlmError> {
        let url = format!("{}/chat/completions", self.base_url(cfg));
        let body = json!({
            "model": cfg.model,
            "temperature": cfg.temperature,
            "max_tokens": cfg.max_tokens,
            "messages": [{ "role": "user", "content": content }],
        });

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &cfg.api_key {
            req = req.bearer_auth(key);
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
        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VlmError::Unknown("missing choices[0].message.content".to_string()))
    }
}

#[async_trait]
impl VlmDialect for OpenAiCompatibleDialect {
    async fn generate_mask_prompt(&self, cfg: &VlmConfig, image: &RgbImage) -> Result<String, VlmError> {
        let data_url = super::to_jpeg_data_url(image);
        let content = json!([
            { "type": "text", "text": mask_prompt_instruction() },
            { "type": "image_url", "image_url": { "url": data_url } },
        ]);
        self.chat(cfg, content).await
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
        let mut parts = vec![json!({
            "type": "text",
            "text": format!(
                "{}\nPlant id: {plant_id}\nMask prompt: {}\nMask description: {}",
                diagnosis_instruction(),
                mask_prompt.unwrap_or("none"),
                mask_description.unwrap_or("none"),
            ),
        })];
        parts.push(json!({ "type": "image_url", "image_url": { "url": super::to_jpeg_data_url(image) } }));
        if let Some(mask) = mask_image {
            parts.push(json!({ "type": "image_url", "image_url": { "url": mask } }));
        }
        self.chat(cfg, serde_json::Value::Array(parts)).await
    }
}
