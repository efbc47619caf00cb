//! Build metadata: persisted per-chunk source hashes and per-(language, chunk)
//! translation status.
//!
//! The metadata file is the only state that survives between runs. It is
//! flushed after every unit of work, so an interrupted build redoes at most
//! one chunk. A missing or corrupt file degrades to an empty record
//! ("translate everything"); it never aborts the build.

use crate::chunks::Chunk;
use crate::content::to_pretty_string;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHash {
    pub hash: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStatus {
    pub translated: bool,
    pub hash: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildMeta {
    pub source_hashes: BTreeMap<String, SourceHash>,
    pub language_status: BTreeMap<String, BTreeMap<String, ChunkStatus>>,
    pub deployment_done: BTreeMap<String, bool>,
}

impl BuildMeta {
    pub fn status(&self, language: &str, chunk: &str) -> Option<&ChunkStatus> {
        self.language_status.get(language)?.get(chunk)
    }

    /// Translated, and translated from exactly this source hash.
    pub fn is_chunk_current(&self, language: &str, chunk: &str, hash: &str) -> bool {
        self.status(language, chunk)
            .is_some_and(|s| s.translated && s.hash.as_deref() == Some(hash))
    }

    /// Record a finished chunk. A newly translated chunk always invalidates
    /// the previous merged deployment for that language.
    pub fn mark_translated(&mut self, language: &str, chunk: &str, hash: &str, now: DateTime<Utc>) {
        self.language_status
            .entry(language.to_string())
            .or_default()
            .insert(
                chunk.to_string(),
                ChunkStatus {
                    translated: true,
                    hash: Some(hash.to_string()),
                    updated_at: Some(now),
                },
            );
        self.deployment_done.insert(language.to_string(), false);
    }

    pub fn is_deployed(&self, language: &str) -> bool {
        self.deployment_done.get(language).copied().unwrap_or(false)
    }

    pub fn mark_deployed(&mut self, language: &str) {
        self.deployment_done.insert(language.to_string(), true);
    }

    /// Store the current hash of every chunk (after invalidation was applied).
    pub fn record_source_hashes(&mut self, chunks: &[Chunk], now: DateTime<Utc>) {
        for chunk in chunks {
            let unchanged = self
                .source_hashes
                .get(&chunk.name)
                .is_some_and(|stored| stored.hash == chunk.content_hash);
            if !unchanged {
                self.source_hashes.insert(
                    chunk.name.clone(),
                    SourceHash {
                        hash: chunk.content_hash.clone(),
                        updated_at: now,
                    },
                );
            }
        }
    }
}

/// Chunks whose current hash differs from the stored one. A chunk with no
/// stored hash is new and therefore changed.
pub fn detect_changes(current: &[Chunk], meta: &BuildMeta) -> Vec<String> {
    current
        .iter()
        .filter(|chunk| {
            meta.source_hashes
                .get(&chunk.name)
                .map_or(true, |stored| stored.hash != chunk.content_hash)
        })
        .map(|chunk| chunk.name.clone())
        .collect()
}

/// Reset translation status for every changed chunk in **every** language,
/// and clear each language's deployment flag. Idempotent.
pub fn apply_invalidation(meta: &mut BuildMeta, changed: &[String], languages: &[&str]) {
    if changed.is_empty() {
        return;
    }
    for language in languages {
        let statuses = meta.language_status.entry(language.to_string()).or_default();
        for chunk in changed {
            statuses.entry(chunk.clone()).or_default().translated = false;
        }
        meta.deployment_done.insert(language.to_string(), false);
    }
}

/// Forget chunks that no longer exist in the source tree. Their keys must
/// leave every artifact, so every known language needs a fresh deployment.
pub fn remove_deleted_chunks(
    meta: &mut BuildMeta,
    current: &[Chunk],
    languages: &[&str],
) -> Vec<String> {
    let present: BTreeSet<&str> = current.iter().map(|c| c.name.as_str()).collect();
    let removed: Vec<String> = meta
        .source_hashes
        .keys()
        .filter(|name| !present.contains(name.as_str()))
        .cloned()
        .collect();
    if removed.is_empty() {
        return removed;
    }

    for name in &removed {
        meta.source_hashes.remove(name);
        for statuses in meta.language_status.values_mut() {
            statuses.remove(name);
        }
    }

    let mut affected: BTreeSet<String> = meta.language_status.keys().cloned().collect();
    affected.extend(languages.iter().map(|l| l.to_string()));
    for language in affected {
        meta.deployment_done.insert(language, false);
    }
    removed
}

/// Owner of the metadata file.
///
/// The in-memory record sits behind a blocking mutex that is only held for
/// short, synchronous mutations. Saves are serialised through a separate
/// async writer gate so concurrent languages never interleave partial writes.
pub struct MetaStore {
    path: PathBuf,
    state: Mutex<BuildMeta>,
    writer: tokio::sync::Mutex<()>,
}

impl MetaStore {
    /// Load the metadata file. Never fails.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let meta = read_meta(&path);
        Self {
            path,
            state: Mutex::new(meta),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BuildMeta> {
        // BuildMeta has no cross-field invariant a panicking writer could break.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> BuildMeta {
        self.lock().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&BuildMeta) -> R) -> R {
        f(&self.lock())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut BuildMeta) -> R) -> R {
        f(&mut self.lock())
    }

    /// Atomically persist the current state: write `<path>.tmp`, then rename.
    pub async fn save(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        let text = to_pretty_string(&self.snapshot())?;
        write_atomic(&self.path, &text).await?;
        debug!("Saved build metadata to {}", self.path.display());
        Ok(())
    }
}

/// Write `<path>.tmp`, then rename it over `path`, creating parent
/// directories as needed. Readers never see a partially written file.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| PipelineError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn read_meta(path: &Path) -> BuildMeta {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BuildMeta::default(),
        Err(e) => {
            warn!(
                "Could not read build metadata at {} ({}), starting from scratch",
                path.display(),
                e
            );
            return BuildMeta::default();
        }
    };

    serde_json::from_str(&text).unwrap_or_else(|e| {
        warn!(
            "Build metadata at {} is corrupt ({}), starting from scratch",
            path.display(),
            e
        );
        BuildMeta::default()
    })
}
