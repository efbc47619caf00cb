//! Error kinds for the translation build pipeline.
//!
//! Callers branch on the variant rather than on message text: fatal kinds
//! halt the whole run, everything else is scoped to a language or a chunk.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required provider credential or endpoint is not configured
    #[error("missing credential: {0} is not set")]
    CredentialMissing(String),

    /// A configuration value is present but unusable
    #[error("invalid configuration: {name}: {detail}")]
    InvalidConfig { name: String, detail: String },

    /// Source content tree could not be read
    #[error("source tree unavailable: {0}")]
    SourceUnavailable(String),

    /// Provider call failed (network, timeout, non-2xx) on every candidate model
    #[error("provider unavailable{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    ProviderUnavailable {
        status: Option<u16>,
        message: String,
    },

    /// Response body held no parsable JSON object, even after repairs
    #[error("could not parse provider response: {message} (snippet: {snippet})")]
    ParseFailed { message: String, snippet: String },

    /// Translation still has blocking issues where a caller required it clean
    #[error("validation failed at {path}: {detail}")]
    ValidationFailed { path: String, detail: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Fatal errors stop the entire run; others stay scoped to one language.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::CredentialMissing(_)
                | PipelineError::InvalidConfig { .. }
                | PipelineError::SourceUnavailable(_)
        )
    }

    /// Transient provider failures worth retrying against the same model:
    /// 429, 5xx, and failures that never produced a status (network, timeout).
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::ProviderUnavailable { status, .. } => match status {
                Some(code) => *code == 429 || *code >= 500,
                None => true,
            },
            _ => false,
        }
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
