//! Translation quality validation.
//!
//! Structural checks compare a translated document against its source key by
//! key: key sets and order, array lengths, placeholder tokens, empty strings
//! and leaked glossary markup. Heuristic checks (language purity, unexpected
//! HTML) catch output that is structurally fine but probably wrong.
//!
//! Every issue kind has exactly one severity. Strict mode promotes advisory
//! issues to blocking; nothing else decides what blocks.

use crate::content::join_path;
use crate::i18n::script::{self, Detected};
use crate::i18n::Language;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IssueKind {
    StructureMismatch,
    PlaceholderMismatch,
    EmptyStringViolation,
    GlossaryMarkupLeak,
    LanguagePurityViolation,
    ExtraHtmlTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Triggers the correction loop
    Blocking,
    /// Logged only, unless strict mode is on
    Advisory,
}

impl IssueKind {
    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::StructureMismatch
            | IssueKind::PlaceholderMismatch
            | IssueKind::EmptyStringViolation
            | IssueKind::GlossaryMarkupLeak => Severity::Blocking,
            IssueKind::LanguagePurityViolation | IssueKind::ExtraHtmlTag => Severity::Advisory,
        }
    }

    pub fn is_blocking(&self, strict: bool) -> bool {
        strict || self.severity() == Severity::Blocking
    }

    pub fn label(&self) -> &'static str {
        match self {
            IssueKind::StructureMismatch => "structure mismatch",
            IssueKind::PlaceholderMismatch => "placeholder mismatch",
            IssueKind::EmptyStringViolation => "empty string violation",
            IssueKind::GlossaryMarkupLeak => "glossary markup leak",
            IssueKind::LanguagePurityViolation => "language purity",
            IssueKind::ExtraHtmlTag => "extra HTML tag",
        }
    }

    /// Standing instruction for the provider when this kind of issue was found.
    fn remedy(&self) -> &'static str {
        match self {
            IssueKind::StructureMismatch => {
                "Keep exactly the same keys, in the same order, with the same nesting and the same array lengths as the source."
            }
            IssueKind::PlaceholderMismatch => {
                "Copy every placeholder ({name}, {{count}}, <1></1>, %s, $1, \\n) unchanged, the same number of times and in the same order as the source."
            }
            IssueKind::EmptyStringViolation => {
                "Source values that are empty strings must stay empty strings; every other value must be translated, never left empty."
            }
            IssueKind::GlossaryMarkupLeak => {
                "Remove helper markup such as <keep> or <translit>; output only the final text."
            }
            IssueKind::LanguagePurityViolation => {
                "Write every value in the target language; do not leave English sentences untranslated or switch to another language."
            }
            IssueKind::ExtraHtmlTag => "Do not add HTML tags that are not present in the source value.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted key path; `(root)` for the document itself
    pub path: String,
    pub kind: IssueKind,
    pub detail: String,
}

impl ValidationIssue {
    fn new(path: &str, kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            path: if path.is_empty() {
                "(root)".to_string()
            } else {
                path.to_string()
            },
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.label(), self.path, self.detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn blocking(&self, strict: bool) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.kind.is_blocking(strict))
            .collect()
    }

    pub fn advisory(&self, strict: bool) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| !i.kind.is_blocking(strict))
            .collect()
    }

    pub fn has_blocking(&self, strict: bool) -> bool {
        self.issues.iter().any(|i| i.kind.is_blocking(strict))
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    fn push(&mut self, path: &str, kind: IssueKind, detail: impl Into<String>) {
        self.issues.push(ValidationIssue::new(path, kind, detail));
    }
}

/// Placeholder token families. Counts and relative order are compared per
/// family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlaceholderKind {
    /// `{{count}}`
    DoubleBrace,
    /// `<1>` / `</1>`
    Wrapper,
    /// `{name}`
    Brace,
    /// `%s`, `%1$d`
    Printf,
    /// `$1`
    Positional,
    /// literal backslash-n
    Newline,
}

impl PlaceholderKind {
    fn label(&self) -> &'static str {
        match self {
            PlaceholderKind::DoubleBrace => "{{...}}",
            PlaceholderKind::Wrapper => "<n> wrapper tag",
            PlaceholderKind::Brace => "{...}",
            PlaceholderKind::Printf => "%s-style",
            PlaceholderKind::Positional => "$n",
            PlaceholderKind::Newline => "\\n",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub kind: PlaceholderKind,
    pub token: String,
}

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_TAG_REGEX: OnceLock<Regex> = OnceLock::new();
static GLOSSARY_TAG_REGEX: OnceLock<Regex> = OnceLock::new();

const GLOSSARY_TAGS: &[&str] = &["keep", "translit", "transliterate", "glossary", "notranslate"];

/// Minimum word count before an English-looking string counts as untranslated
const UNTRANSLATED_MIN_WORDS: usize = 4;

pub struct TranslationValidator;

impl TranslationValidator {
    /// Structural and heuristic checks of `translated` against `source`.
    ///
    /// Purity checks only run for targets written in a non-Latin script.
    pub fn validate(source: &Value, translated: &Value, language: Language) -> ValidationReport {
        let mut report = ValidationReport::new();
        Self::compare(source, translated, "", Some(language), &mut report);
        report
    }

    /// Language-independent checks only.
    pub fn validate_structure(source: &Value, translated: &Value) -> ValidationReport {
        let mut report = ValidationReport::new();
        Self::compare(source, translated, "", None, &mut report);
        report
    }

    fn compare(
        source: &Value,
        translated: &Value,
        path: &str,
        language: Option<Language>,
        report: &mut ValidationReport,
    ) {
        match (source, translated) {
            (Value::Object(src), Value::Object(tr)) => {
                let src_keys: Vec<&String> = src.keys().collect();
                let tr_keys: Vec<&String> = tr.keys().collect();
                if src_keys != tr_keys {
                    report.push(
                        path,
                        IssueKind::StructureMismatch,
                        describe_key_difference(&src_keys, &tr_keys),
                    );
                }
                for (key, src_value) in src {
                    if let Some(tr_value) = tr.get(key) {
                        Self::compare(src_value, tr_value, &join_path(path, key), language, report);
                    }
                }
            }
            (Value::Array(src), Value::Array(tr)) => {
                if src.len() != tr.len() {
                    report.push(
                        path,
                        IssueKind::StructureMismatch,
                        format!("array has {} items, source has {}", tr.len(), src.len()),
                    );
                }
                for (i, (src_item, tr_item)) in src.iter().zip(tr).enumerate() {
                    Self::compare(src_item, tr_item, &join_path(path, &i.to_string()), language, report);
                }
            }
            (Value::String(src), Value::String(tr)) => {
                Self::check_string(src, tr, path, language, report);
            }
            (src, tr) if value_type(src) != value_type(tr) => {
                report.push(
                    path,
                    IssueKind::StructureMismatch,
                    format!("expected {}, found {}", value_type(src), value_type(tr)),
                );
            }
            // Numbers, booleans and nulls pass through untranslated
            _ => {}
        }
    }

    fn check_string(
        source: &str,
        translated: &str,
        path: &str,
        language: Option<Language>,
        report: &mut ValidationReport,
    ) {
        if source.is_empty() {
            if !translated.is_empty() {
                report.push(
                    path,
                    IssueKind::EmptyStringViolation,
                    "source is an empty string but the translation is not",
                );
            }
            return;
        }
        if translated.trim().is_empty() {
            report.push(
                path,
                IssueKind::EmptyStringViolation,
                "translation is empty but the source is not",
            );
            return;
        }

        if let Some(detail) = compare_placeholders(source, translated) {
            report.push(path, IssueKind::PlaceholderMismatch, detail);
        }

        let leaked = Self::extract_glossary_tags(translated);
        if !leaked.is_empty() && Self::extract_glossary_tags(source).is_empty() {
            report.push(
                path,
                IssueKind::GlossaryMarkupLeak,
                format!("helper markup left in output: {}", leaked.join(", ")),
            );
        }

        let Some(language) = language else {
            return;
        };

        let source_tags = Self::extract_html_tags(source);
        let extra: Vec<String> = Self::extract_html_tags(translated)
            .difference(&source_tags)
            .filter(|tag| !GLOSSARY_TAGS.contains(&tag.as_str()))
            .map(|tag| format!("<{}>", tag))
            .collect();
        if !extra.is_empty() {
            report.push(
                path,
                IssueKind::ExtraHtmlTag,
                format!("tags not in source: {}", extra.join(", ")),
            );
        }

        if !language.script().is_latin() {
            if let Some(detail) = check_purity(translated, language) {
                report.push(path, IssueKind::LanguagePurityViolation, detail);
            }
        }
    }

    /// Placeholder tokens in document order.
    pub fn extract_placeholders(text: &str) -> Vec<Placeholder> {
        placeholder_regex()
            .captures_iter(text)
            .filter_map(|cap| {
                let kinds = [
                    ("double", PlaceholderKind::DoubleBrace),
                    ("wrapper", PlaceholderKind::Wrapper),
                    ("brace", PlaceholderKind::Brace),
                    ("printf", PlaceholderKind::Printf),
                    ("positional", PlaceholderKind::Positional),
                    ("newline", PlaceholderKind::Newline),
                ];
                kinds.iter().find_map(|(group, kind)| {
                    cap.name(group).map(|m| Placeholder {
                        kind: *kind,
                        token: m.as_str().to_string(),
                    })
                })
            })
            .collect()
    }

    /// Lowercased HTML tag names, ignoring numeric wrapper tags.
    fn extract_html_tags(text: &str) -> BTreeSet<String> {
        html_tag_regex()
            .captures_iter(text)
            .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_ascii_lowercase()))
            .collect()
    }

    fn extract_glossary_tags(text: &str) -> Vec<String> {
        let regex = GLOSSARY_TAG_REGEX.get_or_init(|| {
            Regex::new(r"(?i)</?(keep|translit|transliterate|glossary|notranslate)\b[^<>]*>").unwrap()
        });

        regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(
            r"(?P<double>\{\{[^{}]*\}\})|(?P<wrapper></?\d+>)|(?P<brace>\{[A-Za-z0-9_.]+\})|(?P<printf>%(?:\d+\$)?[sdif])|(?P<positional>\$\d+)|(?P<newline>\\n)",
        )
        .unwrap()
    })
}

fn html_tag_regex() -> &'static Regex {
    HTML_TAG_REGEX.get_or_init(|| Regex::new(r"</?([A-Za-z][A-Za-z0-9-]*)\b[^<>]*/?>").unwrap())
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

fn describe_key_difference(source: &[&String], translated: &[&String]) -> String {
    let src: BTreeSet<&str> = source.iter().map(|k| k.as_str()).collect();
    let tr: BTreeSet<&str> = translated.iter().map(|k| k.as_str()).collect();

    let missing: Vec<&str> = source
        .iter()
        .map(|k| k.as_str())
        .filter(|k| !tr.contains(k))
        .collect();
    let extra: Vec<&str> = translated
        .iter()
        .map(|k| k.as_str())
        .filter(|k| !src.contains(k))
        .collect();

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing keys: {}", missing.join(", ")));
    }
    if !extra.is_empty() {
        parts.push(format!("unexpected keys: {}", extra.join(", ")));
    }
    if parts.is_empty() {
        parts.push(format!(
            "key order differs (expected {})",
            source.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
        ));
    }
    parts.join("; ")
}

fn compare_placeholders(source: &str, translated: &str) -> Option<String> {
    let src = TranslationValidator::extract_placeholders(source);
    let tr = TranslationValidator::extract_placeholders(translated);

    let kinds: BTreeSet<PlaceholderKind> = src.iter().chain(&tr).map(|p| p.kind).collect();
    let mut problems = Vec::new();
    for kind in kinds {
        let expected = src.iter().filter(|p| p.kind == kind).count();
        let found = tr.iter().filter(|p| p.kind == kind).count();
        if expected != found {
            problems.push(format!(
                "expected {} {} placeholder(s), found {}",
                expected,
                kind.label(),
                found
            ));
        }
    }
    if !problems.is_empty() {
        return Some(problems.join("; "));
    }

    let src_order: Vec<PlaceholderKind> = src.iter().map(|p| p.kind).collect();
    let tr_order: Vec<PlaceholderKind> = tr.iter().map(|p| p.kind).collect();
    if src_order != tr_order {
        return Some(format!(
            "placeholders reordered: expected {}",
            src.iter().map(|p| p.token.as_str()).collect::<Vec<_>>().join(" ")
        ));
    }

    // Named tokens must survive verbatim; order among the same kind may change
    let mut src_names: Vec<&str> = src.iter().map(|p| p.token.as_str()).collect();
    let mut tr_names: Vec<&str> = tr.iter().map(|p| p.token.as_str()).collect();
    src_names.sort_unstable();
    tr_names.sort_unstable();
    if src_names != tr_names {
        let renamed: Vec<&str> = tr_names
            .iter()
            .copied()
            .filter(|t| !src_names.contains(t))
            .collect();
        return Some(format!("placeholders renamed: {}", renamed.join(" ")));
    }

    None
}

fn check_purity(translated: &str, language: Language) -> Option<String> {
    let text = strip_markup(translated);
    let detected = script::detect(&text);

    if !script::is_compatible(detected, language.code()) {
        if let Detected::Language(code) = detected {
            return Some(format!(
                "text appears to be '{}' instead of '{}'",
                code,
                language.code()
            ));
        }
    }

    if detected == Detected::English
        && script::words(&text).len() > UNTRANSLATED_MIN_WORDS
        && !script::has_script_evidence(&text, language.script())
    {
        return Some(format!(
            "text appears to be untranslated English (no {} script found)",
            language.name()
        ));
    }

    None
}

/// Remove placeholders and tags so they do not count as words.
fn strip_markup(text: &str) -> String {
    let without_placeholders = placeholder_regex().replace_all(text, " ");
    html_tag_regex()
        .replace_all(&without_placeholders, " ")
        .into_owned()
}

/// One combined instruction covering every issue, appended to the normal
/// translation instruction on the next attempt.
pub fn correction_instruction(issues: &[&ValidationIssue]) -> String {
    let mut text = String::from(
        "Your previous translation had the problems listed below. Fix every one of them and return the complete corrected JSON object.\n",
    );
    for issue in issues {
        text.push_str(&format!("- {}\n", issue));
    }

    let kinds: BTreeSet<IssueKind> = issues.iter().map(|i| i.kind).collect();
    if !kinds.is_empty() {
        text.push_str("\nRules:\n");
        for kind in kinds {
            text.push_str(&format!("- {}\n", kind.remedy()));
        }
    }
    text
}
