use crate::config::{PipelineConfig, Provider};
use crate::content::to_pretty_string;
use crate::error::{PipelineError, Result};
use crate::i18n::Language;
use crate::rate_limit::RateLimiter;
use crate::retry::{with_retry_if, RetryConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// One unit of work for a translator: a document rooted at the chunk root,
/// the target language and, on correction passes, the extra instruction.
#[derive(Debug, Clone, Copy)]
pub struct TranslationRequest<'a> {
    pub content: &'a Value,
    pub language: Language,
    pub correction: Option<&'a str>,
}

impl<'a> TranslationRequest<'a> {
    pub fn new(content: &'a Value, language: Language) -> Self {
        Self {
            content,
            language,
            correction: None,
        }
    }

    pub fn with_correction(mut self, correction: &'a str) -> Self {
        self.correction = Some(correction);
        self
    }
}

/// Anything that turns a source document into a translated one.
///
/// Implemented by [`ProviderClient`] for real builds; tests substitute fakes.
#[allow(async_fn_in_trait)]
pub trait Translator {
    async fn translate(&self, request: TranslationRequest<'_>) -> Result<Value>;
}

/// OpenAI Chat Completion request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Anthropic Messages request
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

const ANTHROPIC_VERSION: &str = "2023-06-01";
const TRANSLATION_TEMPERATURE: f32 = 0.2;
const SNIPPET_CHARS: usize = 200;

/// Check if a model is a reasoning model that doesn't support temperature
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

fn build_translation_system_prompt(target_language: &str, correction: Option<&str>) -> String {
    let mut prompt = format!(
        r#"You are a professional translator for a documentation website. Translate the values of the JSON object you receive from English to {}.

## Rules

### Structure
- Return a single JSON object with exactly the same keys, key order, nesting and array lengths as the input.
- Never translate keys. Copy numbers, booleans and null unchanged.

### Keep unchanged:
- Placeholders: {{name}}, {{{{count}}}}, <1>...</1>, %s, %1$d, $1 and literal \n
- HTML tags and Markdown syntax; do not add tags that are not in the source
- Product names, code, URLs and command-line text
- Empty strings: an empty source value stays an empty string

### Glossary helpers
- You may mark terms with <keep> or <translit> while working, but the final output must not contain those tags.

### Output
- Respond with the JSON object only: no commentary and no Markdown code fences."#,
        target_language
    );
    if let Some(correction) = correction {
        prompt.push_str("\n\n");
        prompt.push_str(correction);
    }
    prompt
}

fn build_translation_user_prompt(content: &Value, target_language: &str) -> Result<String> {
    Ok(format!(
        "Translate this JSON to {}:\n\n{}",
        target_language,
        to_pretty_string(content)?
    ))
}

/// HTTP client for the configured provider, with ordered model fallback.
///
/// Every outbound request first takes a slot from the shared rate limiter.
/// Within one model, transient failures (429, 5xx, network, timeout) are
/// retried; anything else moves straight on to the next model.
pub struct ProviderClient {
    http: reqwest::Client,
    config: Arc<PipelineConfig>,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
}

impl ProviderClient {
    pub fn new(config: Arc<PipelineConfig>, limiter: Arc<RateLimiter>) -> Self {
        Self::with_client(reqwest::Client::new(), config, limiter)
    }

    pub fn with_client(
        http: reqwest::Client,
        config: Arc<PipelineConfig>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let retry = RetryConfig::provider_call(config.provider_retry_attempts);
        Self {
            http,
            config,
            limiter,
            retry,
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn translate_with_model(&self, model: &str, system: &str, user: &str) -> Result<Value> {
        let raw = with_retry_if(
            &self.retry,
            &format!("Translation with {}", model),
            || self.call_model(model, system, user),
            PipelineError::is_transient,
        )
        .await?;
        extract_json_object(&raw)
    }

    /// One rate-limited, time-bounded HTTP call. Returns the response text.
    async fn call_model(&self, model: &str, system: &str, user: &str) -> Result<String> {
        self.limiter.acquire().await;

        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.send(model, system, user)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::ProviderUnavailable {
                status: None,
                message: format!("{} request timed out after {:?}", model, timeout),
            }),
        }
    }

    async fn send(&self, model: &str, system: &str, user: &str) -> Result<String> {
        let builder = match self.config.provider {
            Provider::OpenAi => {
                let reasoning = is_reasoning_model(model);
                let request = ChatRequest {
                    model,
                    messages: vec![
                        Message {
                            role: "system",
                            content: system,
                        },
                        Message {
                            role: "user",
                            content: user,
                        },
                    ],
                    max_completion_tokens: self.config.response_max_tokens,
                    temperature: if reasoning {
                        None
                    } else {
                        Some(TRANSLATION_TEMPERATURE)
                    },
                    reasoning_effort: if reasoning { Some("low") } else { None },
                };
                self.http
                    .post(&self.config.api_url)
                    .header("Authorization", format!("Bearer {}", self.config.api_key))
                    .json(&request)
            }
            Provider::Anthropic => {
                let request = AnthropicRequest {
                    model,
                    max_tokens: self.config.response_max_tokens,
                    system,
                    temperature: Some(TRANSLATION_TEMPERATURE),
                    messages: vec![AnthropicMessage {
                        role: "user",
                        content: vec![AnthropicContentBlock {
                            kind: "text",
                            text: user,
                        }],
                    }],
                };
                self.http
                    .post(&self.config.api_url)
                    .header("x-api-key", self.config.api_key.trim())
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&request)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| PipelineError::ProviderUnavailable {
                status: e.status().map(|s| s.as_u16()),
                message: format!("failed to send request to {}: {}", model, e),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::ProviderUnavailable {
                status: None,
                message: format!("failed to read response body from {}: {}", model, e),
            })?;

        if !status.is_success() {
            return Err(PipelineError::ProviderUnavailable {
                status: Some(status.as_u16()),
                message: format!("{} returned {}: {}", model, status, snippet(&body)),
            });
        }

        self.response_text(&body)
    }

    /// Pull the assistant text out of a successful response body.
    fn response_text(&self, body: &str) -> Result<String> {
        let parse_failed = |message: String| PipelineError::ParseFailed {
            message,
            snippet: snippet(body),
        };

        let text = match self.config.provider {
            Provider::OpenAi => {
                let response: ChatResponse = serde_json::from_str(body)
                    .map_err(|e| parse_failed(format!("unexpected response shape: {}", e)))?;
                response
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| parse_failed("response contained no choices".to_string()))?
                    .message
                    .content
                    .unwrap_or_default()
            }
            Provider::Anthropic => {
                let response: AnthropicResponse = serde_json::from_str(body)
                    .map_err(|e| parse_failed(format!("unexpected response shape: {}", e)))?;
                response
                    .content
                    .into_iter()
                    .filter_map(|block| match block {
                        AnthropicResponseBlock::Text { text } => Some(text),
                        AnthropicResponseBlock::Other => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        if text.trim().is_empty() {
            return Err(parse_failed("response contained no text".to_string()));
        }
        Ok(text)
    }
}

impl Translator for ProviderClient {
    async fn translate(&self, request: TranslationRequest<'_>) -> Result<Value> {
        let language = request.language;
        let system = build_translation_system_prompt(language.name(), request.correction);
        let user = build_translation_user_prompt(request.content, language.name())?;

        let models = &self.config.models;
        let mut last_error: Option<PipelineError> = None;

        for (i, model) in models.iter().enumerate() {
            debug!("Translating to {} with {}", language.code(), model);
            match self.translate_with_model(model, &system, &user).await {
                Ok(value) => {
                    if i > 0 {
                        info!(
                            "Fallback model {} succeeded for {} after {} failure(s)",
                            model,
                            language.code(),
                            i
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if i + 1 < models.len() {
                        warn!(
                            "Model {} failed for {} ({}), falling back to {}",
                            model,
                            language.code(),
                            e,
                            models[i + 1]
                        );
                    } else {
                        warn!("Model {} failed for {} ({})", model, language.code(), e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e @ PipelineError::ParseFailed { .. }) => e,
            Some(PipelineError::ProviderUnavailable { status, message }) => {
                PipelineError::ProviderUnavailable {
                    status,
                    message: format!(
                        "all {} candidate model(s) failed, last error: {}",
                        models.len(),
                        message
                    ),
                }
            }
            Some(other) => other,
            None => PipelineError::ProviderUnavailable {
                status: None,
                message: "no candidate models configured".to_string(),
            },
        })
    }
}

static TRAILING_COMMA_REGEX: OnceLock<Regex> = OnceLock::new();

/// Parse the JSON object out of a raw model response.
///
/// Code fences are dropped and the first top-level `{...}` block is parsed.
/// If that fails, two repairs are applied and parsing is retried once:
/// trailing commas before `}`/`]` are removed and anything after the last
/// `}` is cut off. The result must be a mapping.
pub fn extract_json_object(raw: &str) -> Result<Value> {
    let parse_failed = |message: &str| PipelineError::ParseFailed {
        message: message.to_string(),
        snippet: snippet(raw),
    };

    let text = strip_code_fences(raw);
    let start = text
        .find('{')
        .ok_or_else(|| parse_failed("no JSON object in response"))?;
    let candidate = first_object(&text[start..]);

    let parsed = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => value,
        Err(first_error) => {
            debug!("Response JSON invalid ({}), applying repairs", first_error);
            let repaired = repair_json(&text[start..]);
            serde_json::from_str::<Value>(&repaired)
                .map_err(|e| parse_failed(&format!("invalid JSON after repair: {}", e)))?
        }
    };

    match parsed {
        Value::Object(_) => Ok(parsed),
        _ => Err(parse_failed("response JSON is not an object")),
    }
}

fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The balanced `{...}` block at the start of `text`, string-aware. When the
/// braces never balance, everything up to the last `}` is returned instead.
fn first_object(text: &str) -> &str {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[..=i];
                }
            }
            _ => {}
        }
    }
    truncate_after_last_brace(text)
}

fn truncate_after_last_brace(text: &str) -> &str {
    match text.rfind('}') {
        Some(end) => &text[..=end],
        None => text,
    }
}

fn repair_json(text: &str) -> String {
    let regex = TRAILING_COMMA_REGEX.get_or_init(|| Regex::new(r",(\s*[}\]])").unwrap());
    let without_commas = regex.replace_all(text, "$1");
    truncate_after_last_brace(&without_commas).to_string()
}

fn snippet(text: &str) -> String {
    let mut out: String = text.chars().take(SNIPPET_CHARS).collect();
    if text.chars().count() > SNIPPET_CHARS {
        out.push_str("...");
    }
    out
}
