//! File-backed collaborators: the suggestion mapping and the ranked feed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::model::RankedPackage;
use crate::traits::{RecordSink, SourceError, SuggestionSource};

/// Reads a `{ "package": "replacement" }` JSON object from disk.
#[derive(Debug, Clone)]
pub struct JsonSuggestions {
    path: PathBuf,
}

impl JsonSuggestions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SuggestionSource for JsonSuggestions {
    async fn load_suggestions(&self) -> Result<HashMap<String, String>, SourceError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    path = %self.path.display(),
                    "No suggestion file, continuing without suggestions"
                );
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&content)?)
    }
}

/// Writes the ranked feed as compact JSON.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonFileSink {
    async fn persist(&self, records: &[RankedPackage]) -> Result<(), SourceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec(records)?;
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }
}
