//! Language registry: single source of truth for all supported languages.
//!
//! Initialised once through `OnceLock` and immutable afterwards.

use crate::i18n::script::Script;
use std::sync::OnceLock;

/// Configuration for a supported language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// ISO 639-1 language code (e.g., "en", "ja")
    pub code: &'static str,

    /// English name of the language, used in provider instructions
    pub name: &'static str,

    /// Native name of the language (e.g., "日本語")
    pub native_name: &'static str,

    /// Writing system; non-Latin targets get language-purity checks
    pub script: Script,

    /// Whether this is the source language (exactly one should be true)
    pub is_canonical: bool,

    /// Whether this language is built by default
    pub enabled: bool,
}

pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    pub fn list_enabled(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().filter(|lang| lang.enabled).collect()
    }

    /// Enabled languages that can be translation targets, in registry order.
    pub fn targets(&self) -> Vec<&LanguageConfig> {
        self.languages
            .iter()
            .filter(|lang| lang.enabled && !lang.is_canonical)
            .collect()
    }

    /// Comma-separated target codes, for error messages and `--list`.
    pub fn target_codes(&self) -> String {
        self.targets()
            .iter()
            .map(|lang| lang.code)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn language(
    code: &'static str,
    name: &'static str,
    native_name: &'static str,
    script: Script,
) -> LanguageConfig {
    LanguageConfig {
        code,
        name,
        native_name,
        script,
        is_canonical: false,
        enabled: true,
    }
}

fn default_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig {
            is_canonical: true,
            ..language("en", "English", "English", Script::Latin)
        },
        language("es", "Spanish", "Español", Script::Latin),
        language("fr", "French", "Français", Script::Latin),
        language("de", "German", "Deutsch", Script::Latin),
        language("it", "Italian", "Italiano", Script::Latin),
        language("pt", "Portuguese", "Português", Script::Latin),
        language("ru", "Russian", "Русский", Script::Cyrillic),
        language("ar", "Arabic", "العربية", Script::Arabic),
        language("hi", "Hindi", "हिन्दी", Script::Devanagari),
        language("ja", "Japanese", "日本語", Script::Japanese),
        language("ko", "Korean", "한국어", Script::Hangul),
        language("zh", "Chinese (Simplified)", "简体中文", Script::Han),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_get_returns_singleton() {
        let registry1 = LanguageRegistry::get();
        let registry2 = LanguageRegistry::get();
        assert!(std::ptr::eq(registry1, registry2));
    }

    #[test]
    fn test_get_by_code_english() {
        let config = LanguageRegistry::get().get_by_code("en").unwrap();
        assert_eq!(config.name, "English");
        assert!(config.is_canonical);
        assert!(config.enabled);
        assert_eq!(config.script, Script::Latin);
    }

    #[test]
    fn test_get_by_code_japanese() {
        let config = LanguageRegistry::get().get_by_code("ja").unwrap();
        assert_eq!(config.name, "Japanese");
        assert_eq!(config.native_name, "日本語");
        assert_eq!(config.script, Script::Japanese);
        assert!(!config.is_canonical);
    }

    #[test]
    fn test_get_by_code_nonexistent() {
        assert!(LanguageRegistry::get().get_by_code("xx").is_none());
    }

    #[test]
    fn test_english_is_the_only_canonical_language() {
        let canonical: Vec<_> = LanguageRegistry::get()
            .languages
            .iter()
            .filter(|lang| lang.is_canonical)
            .map(|lang| lang.code)
            .collect();
        assert_eq!(canonical, vec!["en"]);
    }

    #[test]
    fn test_targets_exclude_canonical() {
        let targets = LanguageRegistry::get().targets();
        assert_eq!(targets.len(), LanguageRegistry::get().list_enabled().len() - 1);
        assert!(targets.iter().all(|lang| lang.code != "en"));
        assert!(targets.iter().any(|lang| lang.code == "it"));
    }

    #[test]
    fn test_target_codes_joined() {
        let codes = LanguageRegistry::get().target_codes();
        assert!(codes.starts_with("es, fr"));
        assert!(!codes.contains("en,"));
    }

    #[test]
    fn test_codes_are_unique() {
        let all = &LanguageRegistry::get().languages;
        let mut codes: Vec<_> = all.iter().map(|l| l.code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
