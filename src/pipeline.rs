//! Build orchestration.
//!
//! One run:
//! 1. Read and hash the source chunks, invalidate what changed, persist.
//! 2. Per language, walk every chunk that is not current:
//!    split (when over budget) → translate → validate → correct → persist.
//!    The first chunk failure stops that language only.
//! 3. Once every chunk of a language is translated, merge, cross-check key
//!    counts, reconcile missing/extra keys (repairs also go back into the
//!    chunk outputs) and deploy.
//!
//! Languages run concurrently on the calling task; chunks within a language
//! are always sequential.

use crate::chunks::{merged_source, Chunk, ChunkStore};
use crate::config::PipelineConfig;
use crate::content::{
    align_key_order, count_leaf_keys, deep_merge, delete_path, get_path, prune_empty_parents,
    set_path,
};
use crate::corrector::Corrector;
use crate::deploy::Deployer;
use crate::error::Result;
use crate::events::{EventSink, PipelineEvent};
use crate::i18n::{Language, TranslationValidator, ValidationIssue};
use crate::meta::{apply_invalidation, detect_changes, remove_deleted_chunks, MetaStore};
use crate::reconcile::{reconcile, Reconciliation};
use crate::splitter::{split, TokenBudget};
use crate::translation::{TranslationRequest, Translator};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageOutcome {
    /// Artifact written this run
    Deployed,
    /// Nothing to do: every chunk current and the artifact already deployed
    UpToDate,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageReport {
    pub language: String,
    pub translated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deployed: bool,
    pub outcome: LanguageOutcome,
}

impl LanguageReport {
    fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            translated: 0,
            skipped: 0,
            failed: 0,
            deployed: false,
            outcome: LanguageOutcome::UpToDate,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, LanguageOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Sorted by language code
    pub languages: Vec<LanguageReport>,
}

impl RunReport {
    pub fn language(&self, code: &str) -> Option<&LanguageReport> {
        self.languages.iter().find(|r| r.language == code)
    }

    pub fn failed_languages(&self) -> usize {
        self.languages.iter().filter(|r| r.is_failed()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_languages() > 0
    }
}

pub struct Pipeline<T> {
    config: Arc<PipelineConfig>,
    translator: T,
    chunks: ChunkStore,
    meta: MetaStore,
    deployer: Deployer,
    events: EventSink,
}

impl<T: Translator> Pipeline<T> {
    pub fn new(config: Arc<PipelineConfig>, translator: T) -> Self {
        Self {
            chunks: ChunkStore::new(config.source_dir.clone()),
            meta: MetaStore::load(config.meta_path.clone()),
            deployer: Deployer::new(config.scratch_dir.clone(), config.output_dir.clone()),
            events: EventSink::noop(),
            config,
            translator,
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    pub fn meta(&self) -> &MetaStore {
        &self.meta
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    /// Run the build for `languages`.
    ///
    /// Only fatal conditions (unreadable source tree, metadata that cannot be
    /// persisted before any work starts) return `Err`. Per-language failures
    /// are reported in the returned `RunReport`.
    pub async fn run(&self, languages: &[Language]) -> Result<RunReport> {
        let chunks = self.chunks.list_chunks()?;
        self.sync_metadata(&chunks).await?;

        self.events.emit(PipelineEvent::RunStarted {
            languages: languages.iter().map(|l| l.code().to_string()).collect(),
            chunks: chunks.len(),
        });

        let source = merged_source(&chunks);
        let chunks = &chunks;
        let source = &source;

        let mut reports: Vec<LanguageReport> = stream::iter(languages.iter().copied())
            .map(move |language| self.run_language(language, chunks, source))
            .buffer_unordered(self.config.language_concurrency.max(1))
            .collect()
            .await;
        reports.sort_by(|a, b| a.language.cmp(&b.language));

        Ok(RunReport { languages: reports })
    }

    /// Apply deletions and source changes to the stored status of every
    /// target language, not only the ones selected for this run.
    async fn sync_metadata(&self, chunks: &[Chunk]) -> Result<()> {
        let targets: Vec<&str> = Language::targets().iter().map(|l| l.code()).collect();

        let (changed, removed) = self.meta.update(|meta| {
            let removed = remove_deleted_chunks(meta, chunks, &targets);
            let changed = detect_changes(chunks, meta);
            apply_invalidation(meta, &changed, &targets);
            meta.record_source_hashes(chunks, Utc::now());
            (changed, removed)
        });

        if !changed.is_empty() || !removed.is_empty() {
            self.events
                .emit(PipelineEvent::ChunksInvalidated { changed, removed });
        }
        self.meta.save().await
    }

    fn is_chunk_done(&self, language: &str, chunk: &Chunk) -> bool {
        self.meta
            .read(|m| m.is_chunk_current(language, &chunk.name, &chunk.content_hash))
            && self.deployer.has_chunk(language, &chunk.name)
    }

    async fn run_language(&self, language: Language, chunks: &[Chunk], source: &Value) -> LanguageReport {
        let code = language.code();
        let mut report = LanguageReport::new(code);

        let mut pending = Vec::new();
        for chunk in chunks {
            if self.is_chunk_done(code, chunk) {
                report.skipped += 1;
                self.events.emit(PipelineEvent::ChunkSkipped {
                    language: code.to_string(),
                    chunk: chunk.name.clone(),
                });
            } else {
                pending.push(chunk);
            }
        }

        if pending.is_empty()
            && self.meta.read(|m| m.is_deployed(code))
            && self.deployer.has_artifact(code)
        {
            debug!("{} is up to date", code);
            return report;
        }

        self.events.emit(PipelineEvent::LanguageStarted {
            language: code.to_string(),
            pending: pending.len(),
        });

        for chunk in pending {
            if let Err(e) = self.translate_chunk(language, chunk).await {
                let reason = format!("{}: {}", chunk.name, e);
                report.failed += 1;
                self.events.emit(PipelineEvent::ChunkFailed {
                    language: code.to_string(),
                    chunk: chunk.name.clone(),
                    reason: e.to_string(),
                });
                return self.fail(report, reason);
            }
            report.translated += 1;
        }

        match self.deploy_language(language, chunks, source).await {
            Ok(()) => {
                report.deployed = true;
                report.outcome = LanguageOutcome::Deployed;
                report
            }
            Err(e) => self.fail(report, format!("deploy: {}", e)),
        }
    }

    fn fail(&self, mut report: LanguageReport, reason: String) -> LanguageReport {
        self.events.emit(PipelineEvent::LanguageFailed {
            language: report.language.clone(),
            reason: reason.clone(),
        });
        report.outcome = LanguageOutcome::Failed(reason);
        report
    }

    async fn translate_chunk(&self, language: Language, chunk: &Chunk) -> Result<()> {
        let code = language.code();
        let strict = self.config.strict_validation;
        self.events.emit(PipelineEvent::ChunkStarted {
            language: code.to_string(),
            chunk: chunk.name.clone(),
        });

        let translator = ChunkTranslator {
            inner: &self.translator,
            name: &chunk.name,
            budget: TokenBudget::new(self.config.max_tokens_per_chunk, self.config.chars_per_token),
            max_depth: self.config.max_split_depth,
        };
        let parts = translator.parts(&chunk.content);
        if parts > 1 {
            self.events.emit(PipelineEvent::ChunkSplit {
                language: code.to_string(),
                chunk: chunk.name.clone(),
                parts,
            });
        }

        let translated = translator
            .translate(TranslationRequest::new(&chunk.content, language))
            .await?;

        let report = TranslationValidator::validate(&chunk.content, &translated, language);
        for issue in &report.issues {
            self.events.emit(PipelineEvent::ValidationIssueFound {
                language: code.to_string(),
                chunk: chunk.name.clone(),
                issue: issue.clone(),
                blocking: issue.kind.is_blocking(strict),
            });
        }

        let blocking: Vec<ValidationIssue> = report.blocking(strict).into_iter().cloned().collect();
        let content = if blocking.is_empty() {
            translated
        } else {
            let corrector = Corrector::new(&translator, self.config.validation_max_retries);
            let correction = corrector
                .correct(&chunk.content, language, translated, blocking, |candidate| {
                    TranslationValidator::validate(&chunk.content, candidate, language)
                        .blocking(strict)
                        .into_iter()
                        .cloned()
                        .collect()
                })
                .await;
            for (i, remaining) in correction.attempts.iter().enumerate() {
                self.events.emit(PipelineEvent::CorrectionAttempted {
                    language: code.to_string(),
                    chunk: chunk.name.clone(),
                    attempt: i + 1,
                    remaining: *remaining,
                });
            }
            correction.content
        };

        let caveats = TranslationValidator::validate(&chunk.content, &content, language)
            .issues
            .len();

        self.deployer.write_chunk(code, &chunk.name, &content).await?;
        self.meta
            .update(|m| m.mark_translated(code, &chunk.name, &chunk.content_hash, Utc::now()));
        self.meta.save().await?;

        self.events.emit(PipelineEvent::ChunkCompleted {
            language: code.to_string(),
            chunk: chunk.name.clone(),
            caveats,
        });
        Ok(())
    }

    async fn deploy_language(&self, language: Language, chunks: &[Chunk], source: &Value) -> Result<()> {
        let code = language.code();
        let names: Vec<String> = chunks.iter().map(|c| c.name.clone()).collect();
        let mut document = self.deployer.merge(code, &names).await?;

        let source_keys = count_leaf_keys(source);
        let translated_keys = count_leaf_keys(&document);
        if source_keys != translated_keys {
            self.events.emit(PipelineEvent::KeyCountMismatch {
                language: code.to_string(),
                source: source_keys,
                translated: translated_keys,
            });
        }

        let mut complete = true;
        if self.config.reconcile_keys {
            let result = reconcile(&self.translator, source, &mut document, language).await;
            if !result.is_noop() {
                self.events.emit(PipelineEvent::KeysReconciled {
                    language: code.to_string(),
                    added: result.added.len(),
                    removed: result.removed.len(),
                    failed: result.failed.len(),
                });
            }
            self.write_back_repairs(code, chunks, &document, &result).await?;
            complete = result.failed.is_empty();
        }

        // An incomplete artifact is still written, but left undeployed so the
        // next run reconciles again.
        let path = if complete {
            self.deployer.deploy(code, &names, &self.meta).await?
        } else {
            self.deployer.write_artifact(code, &document).await?
        };

        self.events.emit(PipelineEvent::LanguageDeployed {
            language: code.to_string(),
            path: path.display().to_string(),
        });
        Ok(())
    }

    /// Carry reconciliation repairs into the scratch outputs.
    ///
    /// An added path goes to the last chunk in merge order whose source
    /// defines it; a removed path is deleted from every output that has it.
    async fn write_back_repairs(
        &self,
        code: &str,
        chunks: &[Chunk],
        document: &Value,
        result: &Reconciliation,
    ) -> Result<()> {
        if result.added.is_empty() && result.removed.is_empty() {
            return Ok(());
        }

        for chunk in chunks {
            let mut output = self.deployer.read_chunk(code, &chunk.name).await?;
            let mut changed = false;

            for path in &result.removed {
                let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                if delete_path(&mut output, &segments).is_some() {
                    prune_empty_parents(&mut output, &segments, |parent| {
                        get_path(&chunk.content, parent).is_some()
                    });
                    changed = true;
                }
            }

            for path in &result.added {
                let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                let owner = chunks
                    .iter()
                    .rev()
                    .find(|c| get_path(&c.content, &segments).is_some());
                if owner.map(|c| c.name.as_str()) != Some(chunk.name.as_str()) {
                    continue;
                }
                if let Some(value) = get_path(document, &segments) {
                    set_path(&mut output, &segments, value.clone());
                    changed = true;
                }
            }

            if changed {
                align_key_order(&chunk.content, &mut output);
                self.deployer.write_chunk(code, &chunk.name, &output).await?;
            }
        }
        Ok(())
    }
}

/// Translator adapter that keeps every request within the token budget.
///
/// Over-budget content is split into sub-chunks, each translated on its own
/// (carrying the same correction instruction), and deep-merged back in
/// originating key order. Both the first pass and corrections go through it.
struct ChunkTranslator<'a, T> {
    inner: &'a T,
    name: &'a str,
    budget: TokenBudget,
    max_depth: usize,
}

impl<T> ChunkTranslator<'_, T> {
    fn parts(&self, content: &Value) -> usize {
        split(content, self.name, &self.budget, self.max_depth).len()
    }
}

impl<T: Translator> Translator for ChunkTranslator<'_, T> {
    async fn translate(&self, request: TranslationRequest<'_>) -> Result<Value> {
        let parts = split(request.content, self.name, &self.budget, self.max_depth);
        if parts.len() == 1 && parts[0].path.is_empty() {
            return self.inner.translate(request).await;
        }

        let mut merged = Value::Object(Map::new());
        for part in &parts {
            debug!("Translating {} for {}", part.name, request.language.code());
            let mut sub = TranslationRequest::new(&part.content, request.language);
            if let Some(correction) = request.correction {
                sub = sub.with_correction(correction);
            }
            deep_merge(&mut merged, self.inner.translate(sub).await?);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    type Respond = dyn Fn(TranslationRequest<'_>) -> Result<Value>;

    /// Records every request and answers through a closure.
    struct FnTranslator {
        requests: RefCell<Vec<(String, Value, Option<String>)>>,
        respond: Box<Respond>,
    }

    impl FnTranslator {
        fn new(respond: impl Fn(TranslationRequest<'_>) -> Result<Value> + 'static) -> Self {
            Self {
                requests: RefCell::new(Vec::new()),
                respond: Box::new(respond),
            }
        }

        /// Prefixes every non-empty string with the language code.
        fn tagging() -> Self {
            Self::new(|request| Ok(tag(request.content, request.language.code())))
        }

        fn calls(&self) -> usize {
            self.requests.borrow().len()
        }

        fn calls_for(&self, code: &str) -> usize {
            self.requests
                .borrow()
                .iter()
                .filter(|(language, _, _)| language == code)
                .count()
        }
    }

    impl Translator for FnTranslator {
        async fn translate(&self, request: TranslationRequest<'_>) -> Result<Value> {
            self.requests.borrow_mut().push((
                request.language.code().to_string(),
                request.content.clone(),
                request.correction.map(String::from),
            ));
            (self.respond)(request)
        }
    }

    fn tag(value: &Value, code: &str) -> Value {
        match value {
            Value::String(s) if s.is_empty() => value.clone(),
            Value::String(s) => Value::String(format!("{}:{}", code, s)),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), tag(v, code)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| tag(v, code)).collect()),
            other => other.clone(),
        }
    }

    fn test_config(root: &Path, extra: &[(&str, &str)]) -> Arc<PipelineConfig> {
        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("OPENAI_API_KEY".into(), "test-key".into());
        vars.insert("SOURCE_DIR".into(), root.join("source").display().to_string());
        vars.insert("OUTPUT_DIR".into(), root.join("out").display().to_string());
        vars.insert("SCRATCH_DIR".into(), root.join("scratch").display().to_string());
        vars.insert("BUILD_META_PATH".into(), root.join("meta.json").display().to_string());
        for (k, v) in extra {
            vars.insert(k.to_string(), v.to_string());
        }
        Arc::new(PipelineConfig::from_vars(|key| vars.get(key).cloned()).unwrap())
    }

    fn write_source(root: &Path, name: &str, content: &Value) {
        let dir = root.join("source");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.json", name)), content.to_string()).unwrap();
    }

    fn lang(code: &str) -> Language {
        Language::from_code(code).unwrap()
    }

    fn read_artifact(root: &Path, code: &str) -> Value {
        let text = std::fs::read_to_string(root.join("out").join(format!("{}.json", code))).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    // ==================== ChunkTranslator Tests ====================

    #[tokio::test]
    async fn test_chunk_translator_passes_small_content_through() {
        let inner = FnTranslator::tagging();
        let translator = ChunkTranslator {
            inner: &inner,
            name: "home",
            budget: TokenBudget::new(4000, 4.0),
            max_depth: 3,
        };

        let content = json!({"title": "Hello"});
        let result = translator
            .translate(TranslationRequest::new(&content, lang("fr")))
            .await
            .unwrap();

        assert_eq!(inner.calls(), 1);
        assert_eq!(result, json!({"title": "fr:Hello"}));
    }

    #[tokio::test]
    async fn test_chunk_translator_splits_and_merges_in_key_order() {
        let inner = FnTranslator::tagging();
        let translator = ChunkTranslator {
            inner: &inner,
            name: "big",
            budget: TokenBudget::new(5, 1.0),
            max_depth: 3,
        };

        let content = json!({"one": {"x": "aaaaaaaa"}, "two": {"y": "bbbbbbbb"}});
        assert_eq!(translator.parts(&content), 2);

        let result = translator
            .translate(TranslationRequest::new(&content, lang("de")).with_correction("fix it"))
            .await
            .unwrap();

        let requests = inner.requests.borrow();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].1, json!({"one": {"x": "aaaaaaaa"}}));
        assert_eq!(requests[1].1, json!({"two": {"y": "bbbbbbbb"}}));
        assert!(requests.iter().all(|(_, _, c)| c.as_deref() == Some("fix it")));

        let keys: Vec<_> = result.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["one", "two"]);
        assert_eq!(result, json!({"one": {"x": "de:aaaaaaaa"}, "two": {"y": "de:bbbbbbbb"}}));
    }

    // ==================== Run Tests ====================

    #[tokio::test]
    async fn test_run_deploys_each_language() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "nav", &json!({"nav": {"home": "Home"}}));
        write_source(dir.path(), "footer", &json!({"footer": {"copy": "All rights reserved"}}));

        let pipeline = Pipeline::new(test_config(dir.path(), &[]), FnTranslator::tagging());
        let report = pipeline.run(&[lang("fr"), lang("es")]).await.unwrap();

        let codes: Vec<_> = report.languages.iter().map(|r| r.language.as_str()).collect();
        assert_eq!(codes, vec!["es", "fr"]);
        for language in &report.languages {
            assert_eq!(language.outcome, LanguageOutcome::Deployed);
            assert_eq!(language.translated, 2);
        }
        assert_eq!(
            read_artifact(dir.path(), "es"),
            json!({"footer": {"copy": "es:All rights reserved"}, "nav": {"home": "es:Home"}})
        );
    }

    #[tokio::test]
    async fn test_second_run_is_up_to_date() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "nav", &json!({"nav": {"home": "Home"}}));
        let config = test_config(dir.path(), &[]);

        Pipeline::new(config.clone(), FnTranslator::tagging())
            .run(&[lang("it")])
            .await
            .unwrap();

        let translator = FnTranslator::tagging();
        let pipeline = Pipeline::new(config, translator);
        let report = pipeline.run(&[lang("it")]).await.unwrap();

        assert_eq!(pipeline.translator.calls(), 0);
        let it = report.language("it").unwrap();
        assert_eq!(it.outcome, LanguageOutcome::UpToDate);
        assert_eq!(it.skipped, 1);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_redeployed_without_translation() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "nav", &json!({"nav": {"home": "Home"}}));
        let config = test_config(dir.path(), &[]);

        Pipeline::new(config.clone(), FnTranslator::tagging())
            .run(&[lang("pt")])
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("out").join("pt.json")).unwrap();

        let pipeline = Pipeline::new(config, FnTranslator::tagging());
        let report = pipeline.run(&[lang("pt")]).await.unwrap();

        assert_eq!(pipeline.translator.calls(), 0);
        assert_eq!(report.language("pt").unwrap().outcome, LanguageOutcome::Deployed);
        assert_eq!(read_artifact(dir.path(), "pt"), json!({"nav": {"home": "pt:Home"}}));
    }

    #[tokio::test]
    async fn test_chunk_failure_stops_only_that_language() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "a", &json!({"a": "First"}));
        write_source(dir.path(), "b", &json!({"b": "Second"}));
        write_source(dir.path(), "c", &json!({"c": "Third"}));

        let translator = FnTranslator::new(|request| {
            if request.language.code() == "es" && request.content.get("b").is_some() {
                return Err(PipelineError::ProviderUnavailable {
                    status: Some(500),
                    message: "boom".to_string(),
                });
            }
            Ok(tag(request.content, request.language.code()))
        });
        let pipeline = Pipeline::new(
            test_config(dir.path(), &[("RECONCILE_KEYS", "false")]),
            translator,
        );
        let report = pipeline.run(&[lang("es"), lang("fr")]).await.unwrap();

        let es = report.language("es").unwrap();
        assert!(es.is_failed());
        assert_eq!((es.translated, es.failed), (1, 1));
        assert!(!pipeline.deployer().has_chunk("es", "c"));
        assert!(!pipeline.deployer().has_artifact("es"));
        assert!(pipeline.meta().read(|m| m.status("es", "a").unwrap().translated));

        assert_eq!(report.language("fr").unwrap().outcome, LanguageOutcome::Deployed);
        assert_eq!(pipeline.translator.calls_for("fr"), 3);
        assert_eq!(report.failed_languages(), 1);
    }

    #[tokio::test]
    async fn test_blocking_issue_is_corrected() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "chunk1", &json!({"a": {"b": "Hi {n}"}}));

        let translator = FnTranslator::new(|request| match request.correction {
            None => Ok(json!({"a": {"b": "Ciao"}})),
            Some(_) => Ok(json!({"a": {"b": "Ciao {n}"}})),
        });
        let (sink, mut rx) = EventSink::channel();
        let pipeline = Pipeline::new(test_config(dir.path(), &[]), translator).with_events(sink);
        pipeline.run(&[lang("it")]).await.unwrap();

        assert_eq!(read_artifact(dir.path(), "it"), json!({"a": {"b": "Ciao {n}"}}));
        drop(pipeline);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::ValidationIssueFound { blocking: true, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::CorrectionAttempted { attempt: 1, remaining: 0, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::ChunkCompleted { caveats: 0, .. }
        )));
    }

    #[tokio::test]
    async fn test_unresolved_issues_keep_translation_with_caveats() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "chunk1", &json!({"a": {"b": "Hi {n}"}}));

        let translator = FnTranslator::new(|_| Ok(json!({"a": {"b": "Ciao"}})));
        let pipeline = Pipeline::new(
            test_config(dir.path(), &[("VALIDATION_MAX_RETRIES", "2")]),
            translator,
        );
        let report = pipeline.run(&[lang("it")]).await.unwrap();

        assert_eq!(pipeline.translator.calls(), 3);
        assert_eq!(report.language("it").unwrap().outcome, LanguageOutcome::Deployed);
        assert_eq!(read_artifact(dir.path(), "it"), json!({"a": {"b": "Ciao"}}));
    }

    #[tokio::test]
    async fn test_missing_key_is_reconciled_before_deploy() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "chunk1", &json!({"x": "One", "y": "Two"}));

        // First pass drops "y"; the single-key reconciliation request restores it.
        let translator = FnTranslator::new(|request| {
            let content = request.content.as_object().unwrap();
            if content.len() == 2 {
                Ok(json!({"x": "Uno"}))
            } else {
                Ok(tag(request.content, "es"))
            }
        });
        let pipeline = Pipeline::new(
            test_config(dir.path(), &[("VALIDATION_MAX_RETRIES", "0")]),
            translator,
        );
        let report = pipeline.run(&[lang("es")]).await.unwrap();

        assert_eq!(report.language("es").unwrap().outcome, LanguageOutcome::Deployed);
        let artifact = read_artifact(dir.path(), "es");
        assert_eq!(artifact, json!({"x": "Uno", "y": "es:Two"}));
        let keys: Vec<_> = artifact.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_missing_source_dir_is_fatal() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(test_config(dir.path(), &[]), FnTranslator::tagging());

        let err = pipeline.run(&[lang("fr")]).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(pipeline.translator.calls(), 0);
    }
}
