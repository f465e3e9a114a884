//! Application configuration — every tunable surfaced as an operator-settable
//! TOML value, with `Default` matching the constants in [`super::defaults`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Root configuration for a running orchestrator instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub status_cache: StatusCacheConfig,
    #[serde(default)]
    pub marker: MarkerConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub vlm_bootstrap: VlmBootstrapConfig,
    #[serde(default)]
    pub diagnosis: DiagnosisConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub mission: MissionConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            status_cache: StatusCacheConfig::default(),
            marker: MarkerConfig::default(),
            segmentation: SegmentationConfig::default(),
            vlm_bootstrap: VlmBootstrapConfig::default(),
            diagnosis: DiagnosisConfig::default(),
            pipeline: PipelineConfig::default(),
            mission: MissionConfig::default(),
            models: ModelsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration using the standard search order:
    /// 1. `$AVIAN_CONFIG` environment variable
    /// 2. `./avian.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("AVIAN_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(mut config) => {
                        config.apply_env_overrides();
                        info!(path = %p.display(), "loaded config from AVIAN_CONFIG");
                        return config;
                    }
                    Err(e) => warn!(path = %p.display(), error = %e, "failed to load AVIAN_CONFIG, falling back"),
                }
            } else {
                warn!(path = %path, "AVIAN_CONFIG points to a non-existent file, falling back");
            }
        }

        let local = PathBuf::from("avian.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(mut config) => {
                    config.apply_env_overrides();
                    info!("loaded config from ./avian.toml");
                    return config;
                }
                Err(e) => warn!(error = %e, "failed to load ./avian.toml, using defaults"),
            }
        }

        info!("no avian.toml found — using built-in defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `AGENT_PORT`, `MODELS_DIR` and per-provider bootstrap env vars override
    /// whatever the file (or defaults) supplied — highest precedence.
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("AGENT_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(dir) = std::env::var("MODELS_DIR") {
            self.models.models_dir = PathBuf::from(dir);
        }
        if let Ok(provider) = std::env::var("AI_PROVIDER") {
            self.vlm_bootstrap.provider = Some(provider);
        }
        for provider in ["OPENAI", "ANTHROPIC", "GOOGLE", "OLLAMA", "QWEN", "DASHSCOPE"] {
            if let Ok(key) = std::env::var(format!("{provider}_API_KEY")) {
                self.vlm_bootstrap.api_key = Some(key);
            }
            if let Ok(base) = std::env::var(format!("{provider}_API_BASE")) {
                self.vlm_bootstrap.api_base = Some(base);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    #[serde(default = "ServerConfig::default_bind")]
    pub bind_addr: String,
}

impl ServerConfig {
    fn default_port() -> u16 {
        defaults::CONTROL_PLANE_PORT
    }
    fn default_bind() -> String {
        "0.0.0.0".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            bind_addr: Self::default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCacheConfig {
    pub battery_threshold: i64,
    pub temperature_threshold: i64,
    pub height_threshold: i64,
    pub position_threshold: f64,
    pub min_broadcast_interval_ms: u64,
    pub cache_ttl_secs: u64,
    pub history_capacity: usize,
}

impl Default for StatusCacheConfig {
    fn default() -> Self {
        Self {
            battery_threshold: defaults::STATUS_BATTERY_THRESHOLD,
            temperature_threshold: defaults::STATUS_TEMPERATURE_THRESHOLD,
            height_threshold: defaults::STATUS_HEIGHT_THRESHOLD,
            position_threshold: defaults::STATUS_POSITION_THRESHOLD,
            min_broadcast_interval_ms: defaults::STATUS_MIN_BROADCAST_INTERVAL_MS,
            cache_ttl_secs: defaults::STATUS_CACHE_TTL_SECS,
            history_capacity: defaults::STATUS_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    pub cooldown_secs: u64,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: defaults::MARKER_COOLDOWN_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    pub endpoint: String,
    pub health_path: String,
    pub health_ttl_secs: u64,
    pub http_timeout_secs: u64,
    pub max_retries: u32,
    pub concurrency_limit: usize,
    pub enable_fallback: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/infer_unipixel_base64".to_string(),
            health_path: "/health".to_string(),
            health_ttl_secs: defaults::SEGMENTATION_HEALTH_TTL_SECS,
            http_timeout_secs: defaults::SEGMENTATION_HTTP_TIMEOUT_SECS,
            max_retries: defaults::SEGMENTATION_MAX_RETRIES,
            concurrency_limit: defaults::SEGMENTATION_CONCURRENCY_LIMIT,
            enable_fallback: true,
        }
    }
}

/// Bootstrap VLM provider defaults (§6.5); a runtime `set_ai_config` command
/// overrides these in the running diagnosis workflow.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VlmBootstrapConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisConfig {
    pub cooldown_secs: u64,
    pub history_capacity: usize,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: defaults::DIAGNOSIS_COOLDOWN_SECS,
            history_capacity: defaults::DIAGNOSIS_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub target_fps: u32,
    pub summary_interval_secs: u64,
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: defaults::PIPELINE_TARGET_FPS,
            summary_interval_secs: defaults::PIPELINE_SUMMARY_INTERVAL_SECS,
            jpeg_quality: defaults::PIPELINE_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionConfig {
    pub target_pads: Vec<i32>,
    pub rounds: u32,
    pub height_cm: i32,
    pub stay_duration_secs: f64,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            target_pads: vec![1, 6],
            rounds: defaults::MISSION_DEFAULT_ROUNDS,
            height_cm: defaults::MISSION_DEFAULT_HEIGHT_CM,
            stay_duration_secs: defaults::MISSION_DEFAULT_STAY_DURATION_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub models_dir: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 3002);
        assert_eq!(cfg.status_cache.battery_threshold, 1);
        assert_eq!(cfg.status_cache.min_broadcast_interval_ms, 100);
        assert_eq!(cfg.diagnosis.cooldown_secs, 30);
        assert_eq!(cfg.marker.cooldown_secs, 60);
    }

    #[test]
    fn load_from_file_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("avian.toml");
        std::fs::write(&path, "[server]\nport = 4000\n").expect("write");
        let cfg = AppConfig::load_from_file(&path).expect("load");
        assert_eq!(cfg.server.port, 4000);
        assert_eq!(cfg.status_cache.battery_threshold, 1);
    }
}
