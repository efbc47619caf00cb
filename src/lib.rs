//! Incremental, LLM-backed translation builds for chunked JSON content.
//!
//! Source content is a directory of JSON chunks in the canonical language.
//! Each run translates only the chunks whose content hash changed, checks
//! every translation against its source, and deploys one merged document per
//! target language.

pub mod chunks;
pub mod config;
pub mod content;
pub mod corrector;
pub mod deploy;
pub mod error;
pub mod events;
pub mod i18n;
pub mod meta;
pub mod pipeline;
pub mod rate_limit;
pub mod reconcile;
pub mod retry;
pub mod splitter;
pub mod translation;

pub use error::{PipelineError, Result};
pub use pipeline::{LanguageOutcome, LanguageReport, Pipeline, RunReport};
