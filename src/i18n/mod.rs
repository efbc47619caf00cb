//! Language metadata and translation quality checks.
//!
//! - `registry`: single source of truth for supported languages
//! - `language`: validated `Language` handle
//! - `script`: Unicode-block and word-list language detection
//! - `validator`: structural and heuristic validation of translated documents
//!
//! ```rust,ignore
//! use i18n_build::i18n::{Language, LanguageRegistry};
//!
//! let japanese = Language::from_code("ja")?;
//! let targets = LanguageRegistry::get().targets();
//! ```

mod language;
mod registry;
pub mod script;
mod validator;

pub use language::Language;
pub use registry::{LanguageConfig, LanguageRegistry};
pub use script::Script;
pub use validator::{
    correction_instruction, IssueKind, Placeholder, PlaceholderKind, Severity,
    TranslationValidator, ValidationIssue, ValidationReport,
};
