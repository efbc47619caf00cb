use crate::error::{PipelineError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Translation provider wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    fn credential_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn url_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_URL",
            Provider::Anthropic => "ANTHROPIC_API_URL",
        }
    }

    fn default_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1/chat/completions",
            Provider::Anthropic => "https://api.anthropic.com/v1/messages",
        }
    }

    /// Fallback order used when `TRANSLATION_MODELS` is not set
    fn default_models(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini|gpt-4o",
            Provider::Anthropic => "claude-3-5-haiku-latest|claude-3-5-sonnet-latest",
        }
    }
}

impl FromStr for Provider {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(PipelineError::InvalidConfig {
                name: "TRANSLATION_PROVIDER".to_string(),
                detail: format!("unknown provider '{}', expected openai or anthropic", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Provider
    pub provider: Provider,
    pub api_key: String,
    pub api_url: String,
    /// Candidate models in fallback order
    pub models: Vec<String>,
    pub request_timeout: Duration,
    pub response_max_tokens: u32,
    /// Attempts per model for transient failures (429, 5xx, network)
    pub provider_retry_attempts: u32,

    // Rate limiting
    pub rate_limit_per_minute: usize,

    // Splitting
    pub max_tokens_per_chunk: usize,
    pub chars_per_token: f64,
    pub max_split_depth: usize,

    // Validation
    pub validation_max_retries: u32,
    pub strict_validation: bool,
    pub reconcile_keys: bool,

    // Scheduling
    pub language_concurrency: usize,

    // Paths
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub meta_path: PathBuf,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any variable lookup.
    ///
    /// Only the provider credential is required; everything else falls back
    /// to a default when unset or unparsable.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match var("TRANSLATION_PROVIDER") {
            Some(name) => name.parse()?,
            None => Provider::OpenAi,
        };

        let api_key = var(provider.credential_var())
            .ok_or_else(|| PipelineError::CredentialMissing(provider.credential_var().into()))?;

        let models = parse_models(
            &var("TRANSLATION_MODELS").unwrap_or_else(|| provider.default_models().to_string()),
        );
        if models.is_empty() {
            return Err(PipelineError::InvalidConfig {
                name: "TRANSLATION_MODELS".to_string(),
                detail: "no model names given".to_string(),
            });
        }

        Ok(Self {
            provider,
            api_key,
            api_url: var(provider.url_var()).unwrap_or_else(|| provider.default_url().to_string()),
            models,
            request_timeout: Duration::from_secs(
                parse_value(var("TRANSLATION_TIMEOUT_SECS")).unwrap_or(120),
            ),
            response_max_tokens: parse_value(var("RESPONSE_MAX_TOKENS")).unwrap_or(8192),
            provider_retry_attempts: parse_value(var("PROVIDER_RETRY_ATTEMPTS")).unwrap_or(2),

            rate_limit_per_minute: parse_value(var("RATE_LIMIT_PER_MINUTE")).unwrap_or(20),

            max_tokens_per_chunk: parse_value(var("MAX_TOKENS_PER_CHUNK")).unwrap_or(4000),
            chars_per_token: parse_value(var("CHARS_PER_TOKEN")).unwrap_or(4.0),
            max_split_depth: parse_value(var("MAX_SPLIT_DEPTH")).unwrap_or(3),

            validation_max_retries: parse_value(var("VALIDATION_MAX_RETRIES")).unwrap_or(2),
            strict_validation: var("STRICT_VALIDATION").map_or(false, |v| parse_flag(&v)),
            reconcile_keys: var("RECONCILE_KEYS").map_or(true, |v| parse_flag(&v)),

            language_concurrency: parse_value::<usize>(var("LANGUAGE_CONCURRENCY"))
                .unwrap_or(1)
                .max(1),

            source_dir: var("SOURCE_DIR").unwrap_or_else(|| "i18n/source".into()).into(),
            output_dir: var("OUTPUT_DIR").unwrap_or_else(|| "i18n".into()).into(),
            scratch_dir: var("SCRATCH_DIR")
                .unwrap_or_else(|| ".i18n-build/chunks".into())
                .into(),
            meta_path: var("BUILD_META_PATH")
                .unwrap_or_else(|| ".i18n-build/build-meta.json".into())
                .into(),
        })
    }
}

fn parse_value<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Pipe-delimited model list; blank entries are dropped.
fn parse_models(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
