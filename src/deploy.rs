//! Per-chunk scratch outputs and final per-language artifacts.
//!
//! Layout:
//! - `<scratch_dir>/<lang>/<chunk>.json`: validated translation of one chunk,
//!   kept between runs as a cache
//! - `<output_dir>/<lang>.json`: merged document consumed by the website

use crate::content::to_pretty_string;
use crate::error::{PipelineError, Result};
use crate::meta::{write_atomic, MetaStore};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Deployer {
    scratch_dir: PathBuf,
    output_dir: PathBuf,
}

impl Deployer {
    pub fn new(scratch_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn chunk_path(&self, language: &str, chunk: &str) -> PathBuf {
        self.scratch_dir
            .join(language)
            .join(format!("{}.json", chunk))
    }

    pub fn artifact_path(&self, language: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", language))
    }

    pub fn has_chunk(&self, language: &str, chunk: &str) -> bool {
        self.chunk_path(language, chunk).is_file()
    }

    pub fn has_artifact(&self, language: &str) -> bool {
        self.artifact_path(language).is_file()
    }

    pub async fn write_chunk(&self, language: &str, chunk: &str, content: &Value) -> Result<()> {
        let path = self.chunk_path(language, chunk);
        write_atomic(&path, &to_pretty_string(content)?).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    pub async fn read_chunk(&self, language: &str, chunk: &str) -> Result<Value> {
        read_json(&self.chunk_path(language, chunk)).await
    }

    /// Deep-merge the scratch outputs of `chunks` in name order.
    ///
    /// The order is fixed by sorting, never by the caller's iteration or
    /// completion order, so the same inputs always merge byte-identically.
    pub async fn merge(&self, language: &str, chunks: &[String]) -> Result<Value> {
        let mut names: Vec<&String> = chunks.iter().collect();
        names.sort();

        let mut merged = Value::Object(Map::new());
        for name in names {
            let content = self.read_chunk(language, name).await?;
            crate::content::deep_merge(&mut merged, content);
        }
        Ok(merged)
    }

    /// Write the final document without touching the deployment flag.
    pub async fn write_artifact(&self, language: &str, document: &Value) -> Result<PathBuf> {
        let path = self.artifact_path(language);
        write_atomic(&path, &to_pretty_string(document)?).await?;
        Ok(path)
    }

    /// Write the final document for `language` and mark it deployed.
    pub async fn publish(&self, language: &str, document: &Value, meta: &MetaStore) -> Result<PathBuf> {
        let path = self.write_artifact(language, document).await?;

        meta.update(|m| m.mark_deployed(language));
        meta.save().await?;

        info!("Deployed {} to {}", language, path.display());
        Ok(path)
    }

    /// Merge every chunk output for `language` and publish the result.
    /// Running it again with unchanged inputs rewrites identical bytes.
    pub async fn deploy(&self, language: &str, chunks: &[String], meta: &MetaStore) -> Result<PathBuf> {
        let document = self.merge(language, chunks).await?;
        self.publish(language, &document, meta).await
    }
}

async fn read_json(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PipelineError::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}
