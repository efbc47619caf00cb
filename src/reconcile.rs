//! Missing/extra-key reconciliation over a merged translation document.
//!
//! A coarse second pass after chunk-level validation. Paths missing from the
//! translation are translated one at a time as minimal single-key payloads;
//! paths the source no longer has are deleted, along with any parent mapping
//! they leave empty that the source does not have.

use crate::content::{
    align_key_order, delete_path, get_path, leaf_key_paths, nest_path, prune_empty_parents,
    set_path,
};
use crate::error::PipelineError;
use crate::i18n::{Language, TranslationValidator};
use crate::translation::{TranslationRequest, Translator};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Key segments from the root to one leaf.
pub type KeyPath = Vec<String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Paths translated and inserted
    pub added: Vec<KeyPath>,
    /// Paths deleted because the source no longer has them
    pub removed: Vec<KeyPath>,
    /// Missing paths that could not be translated this run
    pub failed: Vec<KeyPath>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Bring `translated` to the key structure of `source`.
///
/// Never fails: a missing path whose translation fails is reported in
/// `failed` and left absent. A provider outage stops further calls for the
/// rest of the pass.
pub async fn reconcile<T: Translator>(
    translator: &T,
    source: &Value,
    translated: &mut Value,
    language: Language,
) -> Reconciliation {
    let mut result = Reconciliation::default();

    let source_paths = leaf_key_paths(source);
    let translated_paths = leaf_key_paths(translated);
    let source_set: HashSet<&Vec<String>> = source_paths.iter().collect();
    let translated_set: HashSet<&Vec<String>> = translated_paths.iter().collect();

    for path in translated_paths.iter().filter(|p| !source_set.contains(p)) {
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        if delete_path(translated, &segments).is_some() {
            prune_empty_parents(translated, &segments, |parent| {
                get_path(source, parent).is_some()
            });
            result.removed.push(path.clone());
        }
    }

    let mut provider_down = false;
    for path in source_paths.iter().filter(|p| !translated_set.contains(p)) {
        if provider_down {
            result.failed.push(path.clone());
            continue;
        }

        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        match translate_path(translator, source, &segments, language).await {
            Ok(value) => {
                set_path(translated, &segments, value);
                result.added.push(path.clone());
            }
            Err(e) => {
                warn!(
                    "Could not translate missing key {} for {}: {}",
                    path.join("."),
                    language.code(),
                    e
                );
                provider_down = matches!(e, PipelineError::ProviderUnavailable { .. });
                result.failed.push(path.clone());
            }
        }
    }

    if !result.added.is_empty() {
        align_key_order(source, translated);
    }
    debug!(
        "Reconciled {}: {} added, {} removed, {} failed",
        language.code(),
        result.added.len(),
        result.removed.len(),
        result.failed.len()
    );
    result
}

async fn translate_path<T: Translator>(
    translator: &T,
    source: &Value,
    segments: &[&str],
    language: Language,
) -> Result<Value, PipelineError> {
    let leaf = get_path(source, segments).cloned().unwrap_or(Value::Null);
    let payload = nest_path(segments, leaf);

    let response = translator
        .translate(TranslationRequest::new(&payload, language))
        .await?;

    let report = TranslationValidator::validate_structure(&payload, &response);
    if let Some(issue) = report.blocking(false).first() {
        return Err(PipelineError::ValidationFailed {
            path: issue.path.clone(),
            detail: issue.detail.clone(),
        });
    }

    get_path(&response, segments)
        .cloned()
        .ok_or_else(|| PipelineError::ValidationFailed {
            path: segments.join("."),
            detail: "response does not contain the requested key".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::to_pretty_string;
    use crate::error::Result;
    use serde_json::json;
    use std::cell::RefCell;

    /// Prefixes every string with "it:" and records each payload.
    struct PrefixTranslator {
        payloads: RefCell<Vec<Value>>,
        fail: bool,
    }

    impl PrefixTranslator {
        fn new() -> Self {
            Self {
                payloads: RefCell::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    fn prefix_strings(value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(format!("it:{}", s)),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), prefix_strings(v)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(prefix_strings).collect()),
            other => other.clone(),
        }
    }

    impl Translator for PrefixTranslator {
        async fn translate(&self, request: TranslationRequest<'_>) -> Result<Value> {
            self.payloads.borrow_mut().push(request.content.clone());
            if self.fail {
                return Err(PipelineError::ProviderUnavailable {
                    status: Some(503),
                    message: "down".to_string(),
                });
            }
            Ok(prefix_strings(request.content))
        }
    }

    fn italian() -> Language {
        Language::from_code("it").unwrap()
    }

    fn paths(dotted: &[&str]) -> Vec<KeyPath> {
        dotted
            .iter()
            .map(|p| p.split('.').map(String::from).collect())
            .collect()
    }

    // ==================== Reconcile Tests ====================

    #[tokio::test]
    async fn test_complete_translation_is_noop() {
        let translator = PrefixTranslator::new();
        let source = json!({"a": {"b": "x"}, "c": "y"});
        let mut translated = json!({"a": {"b": "X"}, "c": "Y"});

        let result = reconcile(&translator, &source, &mut translated, italian()).await;

        assert!(result.is_noop());
        assert!(translator.payloads.borrow().is_empty());
        assert_eq!(translated, json!({"a": {"b": "X"}, "c": "Y"}));
    }

    #[tokio::test]
    async fn test_missing_paths_translated_one_at_a_time() {
        let translator = PrefixTranslator::new();
        let source = json!({"nav": {"home": "Home", "docs": "Docs"}, "footer": {"copy": "(c)"}});
        let mut translated = json!({"nav": {"home": "Casa"}});

        let result = reconcile(&translator, &source, &mut translated, italian()).await;

        assert_eq!(result.added, paths(&["nav.docs", "footer.copy"]));
        let payloads = translator.payloads.borrow();
        assert_eq!(payloads[0], json!({"nav": {"docs": "Docs"}}));
        assert_eq!(payloads[1], json!({"footer": {"copy": "(c)"}}));
        assert_eq!(
            to_pretty_string(&translated).unwrap(),
            to_pretty_string(&json!({
                "nav": {"home": "Casa", "docs": "it:Docs"},
                "footer": {"copy": "it:(c)"}
            }))
            .unwrap()
        );
    }

    #[tokio::test]
    async fn test_extra_paths_deleted_and_pruned() {
        let translator = PrefixTranslator::new();
        let source = json!({"keep": "k"});
        let mut translated = json!({"keep": "K", "old": {"section": {"title": "Vecchio"}}});

        let result = reconcile(&translator, &source, &mut translated, italian()).await;

        assert_eq!(result.removed, paths(&["old.section.title"]));
        assert_eq!(translated, json!({"keep": "K"}));
        assert!(translator.payloads.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_mappings_survive_stale_key_removal() {
        let translator = PrefixTranslator::new();
        let source = json!({"e": {}, "keep": "k", "nav": {}});
        let mut translated = json!({"e": {}, "keep": "K", "nav": {"old": "Vecchio"}});

        let result = reconcile(&translator, &source, &mut translated, italian()).await;

        assert_eq!(result.removed, paths(&["nav.old"]));
        assert_eq!(translated, json!({"e": {}, "keep": "K", "nav": {}}));
    }

    #[tokio::test]
    async fn test_restores_source_key_order() {
        let translator = PrefixTranslator::new();
        let source = json!({"first": "1", "second": "2", "third": "3"});
        let mut translated = json!({"first": "uno", "third": "tre"});

        reconcile(&translator, &source, &mut translated, italian()).await;

        let keys: Vec<_> = translated.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_provider_outage_stops_further_calls() {
        let translator = PrefixTranslator::failing();
        let source = json!({"a": "1", "b": "2", "c": "3"});
        let mut translated = json!({});

        let result = reconcile(&translator, &source, &mut translated, italian()).await;

        assert_eq!(translator.payloads.borrow().len(), 1);
        assert_eq!(result.failed, paths(&["a", "b", "c"]));
        assert!(result.added.is_empty());
        assert_eq!(translated, json!({}));
    }
}
