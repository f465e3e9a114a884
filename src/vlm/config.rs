//! VLM provider configuration (§4.5): validated before first call, held as
//! a single slot inside the diagnosis workflow and published via copy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
    Google,
    Ollama,
    Qwen,
    Dashscope,
}

impl Provider {
    /// Parses a provider name as accepted over the wire (`set_ai_config`)
    /// and from the `AI_PROVIDER` bootstrap env var, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Some(Self::Openai),
            "anthropic" => Some(Self::Anthropic),
            "google" => Some(Self::Google),
            "ollama" => Some(Self::Ollama),
            "qwen" => Some(Self::Qwen),
            "dashscope" => Some(Self::Dashscope),
            _ => None,
        }
    }

    fn api_key_rule(self) -> Option<(&'static str, usize)> {
        match self {
            Self::Openai => Some(("sk-", 20)),
            Self::Anthropic => Some(("sk-ant-", 20)),
            Self::Google => Some(("AIza", 10)),
            Self::Qwen | Self::Dashscope => Some(("sk-", 10)),
            // Self-hosted; key is optional.
            Self::Ollama => None,
        }
    }

    fn vision_whitelist(self) -> &'static [&'static str] {
        match self {
            Self::Openai => &["gpt-4o", "gpt-4-vision", "gpt-4-turbo"],
            Self::Anthropic => &["claude-3", "claude-3-5"],
            Self::Google => &["gemini-1.5", "gemini-pro-vision"],
            Self::Qwen => &["qwen-vl"],
            Self::Dashscope => &["qwen-vl"],
            Self::Ollama => &["llava", "bakllava"],
        }
    }
}

const VISION_KEYWORDS: &[&str] = &["vl", "vision", "visual", "multimodal", "image"];

#[derive(Debug, Error)]
pub enum VlmConfigError {
    #[error("temperature {0} is outside the allowed range [0, 2]")]
    TemperatureOutOfRange(f32),
    #[error("max_tokens {0} is outside the allowed range [1, 100000]")]
    MaxTokensOutOfRange(u32),
    #[error("api key is too short or missing the expected prefix for provider {provider:?}")]
    InvalidApiKeyFormat { provider: Provider },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlmConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Computed at construction time, not user-supplied.
    pub supports_vision: bool,
}

impl VlmConfig {
    pub fn new(
        provider: Provider,
        model: String,
        api_key: Option<String>,
        api_base: Option<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Self, VlmConfigError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(VlmConfigError::TemperatureOutOfRange(temperature));
        }
        if !(1..=100_000).contains(&max_tokens) {
            return Err(VlmConfigError::MaxTokensOutOfRange(max_tokens));
        }
        if let Some((prefix, min_len)) = provider.api_key_rule() {
            let key = api_key.as_deref().unwrap_or("");
            if key.len() < min_len || !key.starts_with(prefix) {
                return Err(VlmConfigError::InvalidApiKeyFormat { provider });
            }
        }

        let model_lower = model.to_lowercase();
        let supports_vision = provider
            .vision_whitelist()
            .iter()
            .any(|m| model_lower.contains(m))
            || VISION_KEYWORDS.iter().any(|kw| model_lower.contains(kw));

        if !provider.vision_whitelist().iter().any(|m| model_lower.contains(m)) && supports_vision {
            tracing::warn!(model = %model, "model accepted as vision-capable via keyword heuristic, not the provider whitelist");
        }

        Ok(Self {
            provider,
            model,
            api_key,
            api_base,
            temperature,
            max_tokens,
            supports_vision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_openai_key() {
        let err = VlmConfig::new(
            Provider::Openai,
            "gpt-4o".to_string(),
            Some("sk-short".to_string()),
            None,
            0.7,
            2000,
        )
        .unwrap_err();
        assert!(matches!(err, VlmConfigError::InvalidApiKeyFormat { .. }));
    }

    #[test]
    fn accepts_ollama_without_key() {
        let cfg = VlmConfig::new(
            Provider::Ollama,
            "llava".to_string(),
            None,
            Some("http://localhost:11434".to_string()),
            0.7,
            2000,
        )
        .expect("ollama key is optional");
        assert!(cfg.supports_vision);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let err = VlmConfig::new(
            Provider::Ollama,
            "llava".to_string(),
            None,
            None,
            3.0,
            2000,
        )
        .unwrap_err();
        assert!(matches!(err, VlmConfigError::TemperatureOutOfRange(_)));
    }

    #[test]
    fn heuristic_accepts_unlisted_vision_model() {
        let cfg = VlmConfig::new(
            Provider::Openai,
            "sk-some-vl-finetune".to_string(),
            Some("sk-AAAAAAAAAAAAAAAAAAAA".to_string()),
            None,
            0.7,
            2000,
        )
        .expect("keyword heuristic should accept");
        assert!(cfg.supports_vision);
    }
}
