//! Progress events emitted by the pipeline.
//!
//! The pipeline only sends events; rendering is the job of a subscriber such
//! as [`LogObserver`]. Sending never blocks and never fails the build.

use crate::i18n::ValidationIssue;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted {
        languages: Vec<String>,
        chunks: usize,
    },
    /// Chunks whose source changed (or disappeared) since the last run
    ChunksInvalidated {
        changed: Vec<String>,
        removed: Vec<String>,
    },
    LanguageStarted {
        language: String,
        pending: usize,
    },
    ChunkSkipped {
        language: String,
        chunk: String,
    },
    ChunkStarted {
        language: String,
        chunk: String,
    },
    ChunkSplit {
        language: String,
        chunk: String,
        parts: usize,
    },
    ChunkCompleted {
        language: String,
        chunk: String,
        /// Advisory (or unresolved) issues the translation was accepted with
        caveats: usize,
    },
    ChunkFailed {
        language: String,
        chunk: String,
        reason: String,
    },
    ValidationIssueFound {
        language: String,
        chunk: String,
        issue: ValidationIssue,
        blocking: bool,
    },
    CorrectionAttempted {
        language: String,
        chunk: String,
        attempt: usize,
        remaining: usize,
    },
    KeyCountMismatch {
        language: String,
        source: usize,
        translated: usize,
    },
    KeysReconciled {
        language: String,
        added: usize,
        removed: usize,
        failed: usize,
    },
    LanguageDeployed {
        language: String,
        path: String,
    },
    LanguageFailed {
        language: String,
        reason: String,
    },
}

/// Cloneable sending half of the event stream.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening; the build carries on.
            let _ = tx.send(event);
        }
    }
}

/// Renders the event stream through `tracing`.
pub struct LogObserver;

impl LogObserver {
    /// Consume events until every sender is dropped.
    pub async fn run(mut rx: mpsc::UnboundedReceiver<PipelineEvent>) {
        while let Some(event) = rx.recv().await {
            Self::render(&event);
        }
    }

    pub fn render(event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { languages, chunks } => {
                info!(
                    "Starting translation build: {} chunk(s), languages [{}]",
                    chunks,
                    languages.join(", ")
                );
            }
            PipelineEvent::ChunksInvalidated { changed, removed } => {
                if !changed.is_empty() {
                    info!("Source changed in {} chunk(s): {}", changed.len(), changed.join(", "));
                }
                if !removed.is_empty() {
                    info!("Source removed {} chunk(s): {}", removed.len(), removed.join(", "));
                }
            }
            PipelineEvent::LanguageStarted { language, pending } => {
                info!("[{}] {} chunk(s) to translate", language, pending);
            }
            PipelineEvent::ChunkSkipped { language, chunk } => {
                debug!("[{}] {} is up to date", language, chunk);
            }
            PipelineEvent::ChunkStarted { language, chunk } => {
                info!("[{}] Translating {}", language, chunk);
            }
            PipelineEvent::ChunkSplit {
                language,
                chunk,
                parts,
            } => {
                info!("[{}] {} exceeds the token budget, split into {} parts", language, chunk, parts);
            }
            PipelineEvent::ChunkCompleted {
                language,
                chunk,
                caveats,
            } => {
                if *caveats > 0 {
                    warn!("[{}] ✓ {} translated with {} caveat(s)", language, chunk, caveats);
                } else {
                    info!("[{}] ✓ {} translated", language, chunk);
                }
            }
            PipelineEvent::ChunkFailed {
                language,
                chunk,
                reason,
            } => {
                error!("[{}] ✗ {} failed: {}", language, chunk, reason);
            }
            PipelineEvent::ValidationIssueFound {
                language,
                chunk,
                issue,
                blocking,
            } => {
                if *blocking {
                    warn!("[{}] {}: {}", language, chunk, issue);
                } else {
                    debug!("[{}] {} (advisory): {}", language, chunk, issue);
                }
            }
            PipelineEvent::CorrectionAttempted {
                language,
                chunk,
                attempt,
                remaining,
            } => {
                info!(
                    "[{}] Correction attempt {} for {}: {} blocking issue(s) left",
                    language, attempt, chunk, remaining
                );
            }
            PipelineEvent::KeyCountMismatch {
                language,
                source,
                translated,
            } => {
                warn!(
                    "[{}] Key count mismatch: source has {}, translation has {}",
                    language, source, translated
                );
            }
            PipelineEvent::KeysReconciled {
                language,
                added,
                removed,
                failed,
            } => {
                info!(
                    "[{}] Reconciled keys: {} added, {} removed, {} failed",
                    language, added, removed, failed
                );
            }
            PipelineEvent::LanguageDeployed { language, path } => {
                info!("[{}] Deployed to {}", language, path);
            }
            PipelineEvent::LanguageFailed { language, reason } => {
                error!("[{}] Language failed: {}", language, reason);
            }
        }
    }
}
