//! Model registry (§6.5 sidecar): register/list/remove custom object-
//! detection models, backed by a JSON sidecar alongside the model files.
//! Internal only — no control-plane command surfaces this directly.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),
    #[error("model {0} is already registered")]
    AlreadyRegistered(String),
    #[error("unknown model id: {0}")]
    UnknownModel(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("sidecar is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Builtin,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub file_hash: String,
    pub num_classes: usize,
    pub class_names: Vec<String>,
    pub format: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub source_url: Option<String>,
    pub uploaded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Sidecar {
    #[serde(flatten)]
    models: std::collections::HashMap<String, ModelMetadata>,
}

/// Registers and looks up detection models against a JSON sidecar file,
/// `{models_dir}/models_metadata.json`. Custom models are keyed
/// `custom_<12-hex-prefix-of-md5>` so the same file registered twice
/// collides on id rather than duplicating storage.
pub struct ModelRegistry {
    models_dir: PathBuf,
    sidecar_path: PathBuf,
    state: Mutex<Sidecar>,
}

impl ModelRegistry {
    pub fn open(models_dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let models_dir = models_dir.into();
        std::fs::create_dir_all(&models_dir)?;
        let sidecar_path = models_dir.join("models_metadata.json");
        let state = if sidecar_path.exists() {
            let text = std::fs::read_to_string(&sidecar_path)?;
            serde_json::from_str(&text)?
        } else {
            Sidecar::default()
        };
        Ok(Self {
            models_dir,
            sidecar_path,
            state: Mutex::new(state),
        })
    }

    fn save(&self, state: &Sidecar) -> Result<(), RegistryError> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.sidecar_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, &self.sidecar_path)?;
        Ok(())
    }

    /// Copies `source_path` into the models directory, computes its md5,
    /// and records it under `custom_<12-hex-prefix>`. Returns the model id.
    pub fn register_model(
        &self,
        source_path: &Path,
        name: &str,
        description: &str,
        tags: Vec<String>,
        num_classes: usize,
        class_names: Vec<String>,
    ) -> Result<String, RegistryError> {
        if !source_path.exists() {
            return Err(RegistryError::NotFound(source_path.to_path_buf()));
        }
        let bytes = std::fs::read(source_path)?;
        let digest = md5::compute(&bytes);
        let hash = format!("{digest:x}");
        let model_id = format!("custom_{}", &hash[..12]);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.models.contains_key(&model_id) {
            return Err(RegistryError::AlreadyRegistered(model_id));
        }

        let extension = source_path.extension().and_then(|e| e.to_str()).unwrap_or("bin");
        let dest_path = self.models_dir.join(format!("{model_id}.{extension}"));
        std::fs::write(&dest_path, &bytes)?;

        let metadata = ModelMetadata {
            name: name.to_string(),
            description: description.to_string(),
            tags,
            file_path: dest_path,
            file_size: bytes.len() as u64,
            file_hash: hash,
            num_classes,
            class_names,
            format: format!(".{extension}"),
            model_type: ModelType::Custom,
            source_url: None,
            uploaded_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        state.models.insert(model_id.clone(), metadata);
        self.save(&state)?;
        info!(model_id = %model_id, name, "registered model");
        Ok(model_id)
    }

    pub fn list_models(&self) -> Vec<(String, ModelMetadata)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.models.iter().map(|(id, meta)| (id.clone(), meta.clone())).collect()
    }

    pub fn get_model(&self, model_id: &str) -> Option<ModelMetadata> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).models.get(model_id).cloned()
    }

    pub fn remove_model(&self, model_id: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(metadata) = state.models.remove(model_id) else {
            return Err(RegistryError::UnknownModel(model_id.to_string()));
        };
        if let Err(e) = std::fs::remove_file(&metadata.file_path) {
            warn!(model_id, error = %e, "model file missing or already removed on disk");
        }
        self.save(&state)?;
        info!(model_id, "removed model");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_list_then_remove_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model_file = dir.path().join("source.onnx");
        std::fs::write(&model_file, b"fake weights").expect("write source");

        let registry = ModelRegistry::open(dir.path().join("models")).expect("open");
        let id = registry
            .register_model(&model_file, "test-model", "a test model", vec!["test".to_string()], 3, vec!["a".into(), "b".into(), "c".into()])
            .expect("register");
        assert!(id.starts_with("custom_"));

        let models = registry.list_models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].0, id);

        registry.remove_model(&id).expect("remove");
        assert!(registry.list_models().is_empty());
    }

    #[test]
    fn registering_the_same_file_twice_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model_file = dir.path().join("source.onnx");
        std::fs::write(&model_file, b"identical bytes").expect("write source");

        let registry = ModelRegistry::open(dir.path().join("models")).expect("open");
        registry.register_model(&model_file, "first", "", vec![], 1, vec!["a".into()]).expect("register once");
        let result = registry.register_model(&model_file, "second", "", vec![], 1, vec!["a".into()]);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn sidecar_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model_file = dir.path().join("source.onnx");
        std::fs::write(&model_file, b"persisted weights").expect("write source");
        let models_dir = dir.path().join("models");

        let id = {
            let registry = ModelRegistry::open(&models_dir).expect("open");
            registry.register_model(&model_file, "persisted", "", vec![], 2, vec!["a".into(), "b".into()]).expect("register")
        };

        let reopened = ModelRegistry::open(&models_dir).expect("reopen");
        assert!(reopened.get_model(&id).is_some());
    }
}
