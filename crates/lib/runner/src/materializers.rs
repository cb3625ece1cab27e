//! Materializers persist output values named by materialization steps.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum MaterializerError {
    #[error("invalid materialization config: {0}")]
    InvalidConfig(String),
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a materialization step asks a materializer to persist.
#[derive(Clone, Copy, Debug)]
pub struct MaterializationRequest<'a> {
    pub step_key: &'a str,
    pub solid: &'a str,
    pub output: &'a str,
    pub config: &'a Value,
}

/// Outcome of one materialization, collected on the run result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterializationRecord {
    pub step_key: String,
    pub kind: String,
    pub location: Option<String>,
}

pub trait Materializer: Send + Sync {
    fn kind(&self) -> &str;

    fn materialize(
        &self,
        request: &MaterializationRequest<'_>,
        value: &Value,
    ) -> Result<MaterializationRecord, MaterializerError>;
}

/// Writes the value as pretty-printed JSON to `config.path`.
#[derive(Clone, Debug, Default)]
pub struct JsonFileMaterializer;

impl JsonFileMaterializer {
    pub const KIND: &'static str = "json";
}

impl Materializer for JsonFileMaterializer {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn materialize(
        &self,
        request: &MaterializationRequest<'_>,
        value: &Value,
    ) -> Result<MaterializationRecord, MaterializerError> {
        let path = request
            .config
            .get("path")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .ok_or_else(|| {
                MaterializerError::InvalidConfig(format!(
                    "{} requires a string `path`",
                    request.step_key
                ))
            })?;

        let encoded = serde_json::to_vec_pretty(value)?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| MaterializerError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        fs::write(&path, encoded).map_err(|source| MaterializerError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Ok(MaterializationRecord {
            step_key: request.step_key.to_string(),
            kind: Self::KIND.to_string(),
            location: Some(path.display().to_string()),
        })
    }
}

/// Keeps materialized values in memory, keyed by step.
#[derive(Clone, Debug, Default)]
pub struct MemoryMaterializer {
    values: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MemoryMaterializer {
    pub const KIND: &'static str = "memory";

    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every `(step_key, value)` pair materialized so far.
    pub fn values(&self) -> Vec<(String, Value)> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Materializer for MemoryMaterializer {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn materialize(
        &self,
        request: &MaterializationRequest<'_>,
        value: &Value,
    ) -> Result<MaterializationRecord, MaterializerError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.step_key.to_string(), value.clone()));
        Ok(MaterializationRecord {
            step_key: request.step_key.to_string(),
            kind: Self::KIND.to_string(),
            location: None,
        })
    }
}
