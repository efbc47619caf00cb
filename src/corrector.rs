//! Bounded self-correction loop.
//!
//! Given a translation with blocking issues, re-translate the source with a
//! combined correction instruction and re-check, up to `max_retries` times.
//! The loop never fails and never returns nothing: the best candidate seen
//! (fewest blocking issues, latest on ties) is kept, starting with the
//! original translation.

use crate::i18n::{correction_instruction, Language, ValidationIssue};
use crate::translation::{TranslationRequest, Translator};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub content: Value,
    /// Blocking issues still present in `content`
    pub remaining: Vec<ValidationIssue>,
    /// Blocking issue count after each correction attempt, in order
    pub attempts: Vec<usize>,
}

impl Correction {
    pub fn is_clean(&self) -> bool {
        self.remaining.is_empty()
    }
}

pub struct Corrector<'a, T> {
    translator: &'a T,
    max_retries: u32,
}

impl<'a, T: Translator> Corrector<'a, T> {
    pub fn new(translator: &'a T, max_retries: u32) -> Self {
        Self {
            translator,
            max_retries,
        }
    }

    /// `check` returns the blocking issues of a candidate; the caller owns
    /// severity filtering.
    pub async fn correct<F>(
        &self,
        source: &Value,
        language: Language,
        translated: Value,
        issues: Vec<ValidationIssue>,
        mut check: F,
    ) -> Correction
    where
        F: FnMut(&Value) -> Vec<ValidationIssue>,
    {
        let mut best = Correction {
            content: translated,
            remaining: issues,
            attempts: Vec::new(),
        };
        let mut current = best.remaining.clone();

        for attempt in 1..=self.max_retries {
            if current.is_empty() {
                break;
            }

            let instruction = correction_instruction(&current.iter().collect::<Vec<_>>());
            let request = TranslationRequest::new(source, language).with_correction(&instruction);

            let candidate = match self.translator.translate(request).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!(
                        "Correction attempt {}/{} for {} failed: {}",
                        attempt,
                        self.max_retries,
                        language.code(),
                        e
                    );
                    best.attempts.push(current.len());
                    break;
                }
            };

            let found = check(&candidate);
            debug!(
                "Correction attempt {}/{} for {}: {} blocking issue(s)",
                attempt,
                self.max_retries,
                language.code(),
                found.len()
            );
            best.attempts.push(found.len());

            if found.len() <= best.remaining.len() {
                best.content = candidate;
                best.remaining = found.clone();
            }
            current = found;
        }

        best
    }
}
