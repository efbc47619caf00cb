//! Chunk store: the source-language content tree.
//!
//! Every `*.json` file directly under the source directory is one chunk,
//! named by its file stem. Chunks come back sorted by name so hashing and
//! merging are deterministic.

use crate::content::{canonical_json, deep_merge};
use crate::error::{PipelineError, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One named, independently hashed unit of source content.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub name: String,
    pub content: Value,
    pub content_hash: String,
}

impl Chunk {
    pub fn new(name: impl Into<String>, content: Value) -> Self {
        let content_hash = content_hash(&content);
        Self {
            name: name.into(),
            content,
            content_hash,
        }
    }
}

/// Lowercase hex SHA-256 over the canonical serialization. Reordering keys
/// changes the hash.
pub fn content_hash(content: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(content).as_bytes());
    hex::encode(hasher.finalize())
}

/// Deep-merge every chunk in the order given (callers pass name order).
pub fn merged_source(chunks: &[Chunk]) -> Value {
    let mut merged = Value::Object(Map::new());
    for chunk in chunks {
        deep_merge(&mut merged, chunk.content.clone());
    }
    merged
}

pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read and hash every chunk.
    ///
    /// An unreadable directory, an unreadable file or a document that is not
    /// a JSON mapping is fatal: the build cannot proceed on a partial tree.
    pub fn list_chunks(&self) -> Result<Vec<Chunk>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: {}", self.root.display(), e))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                PipelineError::SourceUnavailable(format!("{}: {}", self.root.display(), e))
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }

        let mut chunks = paths
            .into_iter()
            .map(|path| self.read_chunk(&path))
            .collect::<Result<Vec<_>>>()?;
        chunks.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            "Loaded {} chunks from {}",
            chunks.len(),
            self.root.display()
        );
        Ok(chunks)
    }

    fn read_chunk(&self, path: &Path) -> Result<Chunk> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                PipelineError::SourceUnavailable(format!(
                    "chunk file name is not valid UTF-8: {}",
                    path.display()
                ))
            })?
            .to_string();

        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let content: Value = serde_json::from_str(&text).map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: invalid JSON: {}", path.display(), e))
        })?;
        if !content.is_object() {
            return Err(PipelineError::SourceUnavailable(format!(
                "{}: top-level value must be a mapping",
                path.display()
            )));
        }

        Ok(Chunk::new(name, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) {
        std::fs::write(dir.path().join(name), body).expect("write chunk");
    }

    // ==================== Hashing Tests ====================

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let hash = content_hash(&json!({"a": "b"}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn test_content_hash_stable_for_same_document() {
        let a = json!({"x": "1", "y": {"p": "2", "q": "3"}});
        assert_eq!(content_hash(&a), content_hash(&a.clone()));
    }

    #[test]
    fn test_content_hash_detects_key_reorder() {
        let a = json!({"x": "1", "y": {"p": "2", "q": "3"}});
        let b = json!({"x": "1", "y": {"q": "3", "p": "2"}});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_content_hash_detects_value_change() {
        let a = json!({"x": "Hello"});
        let b = json!({"x": "Hello!"});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    // ==================== Listing Tests ====================

    #[test]
    fn test_list_chunks_sorted_by_name() {
        let dir = TempDir::new().expect("temp dir");
        write(&dir, "zeta.json", r#"{"z": "1"}"#);
        write(&dir, "alpha.json", r#"{"a": "1"}"#);
        write(&dir, "notes.txt", "ignored");
        std::fs::create_dir(dir.path().join("nested.json")).expect("mkdir");

        let chunks = ChunkStore::new(dir.path()).list_chunks().expect("list");
        let names: Vec<_> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(chunks[0].content_hash, content_hash(&json!({"a": "1"})));
    }

    #[test]
    fn test_list_chunks_missing_dir_is_fatal() {
        let dir = TempDir::new().expect("temp dir");
        let err = ChunkStore::new(dir.path().join("missing"))
            .list_chunks()
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_list_chunks_rejects_non_mapping() {
        let dir = TempDir::new().expect("temp dir");
        write(&dir, "list.json", r#"["a", "b"]"#);
        let err = ChunkStore::new(dir.path()).list_chunks().unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }

    #[test]
    fn test_list_chunks_rejects_invalid_json() {
        let dir = TempDir::new().expect("temp dir");
        write(&dir, "broken.json", r#"{"a": "#);
        let err = ChunkStore::new(dir.path()).list_chunks().unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));
    }

    #[test]
    fn test_merged_source_in_name_order() {
        let chunks = vec![
            Chunk::new("a", json!({"shared": {"x": "1"}, "only_a": "a"})),
            Chunk::new("b", json!({"shared": {"y": "2"}})),
        ];
        assert_eq!(
            merged_source(&chunks),
            json!({"shared": {"x": "1", "y": "2"}, "only_a": "a"})
        );
    }
}
