//! Validated language handle.
//!
//! A `Language` can only be constructed from a registry entry, so every
//! accessor is infallible.

use crate::i18n::registry::{LanguageConfig, LanguageRegistry};
use crate::i18n::script::Script;
use anyhow::{bail, Result};
use std::fmt;

#[derive(Clone, Copy)]
pub struct Language {
    config: &'static LanguageConfig,
}

impl Language {
    /// Look up an enabled language by its ISO 639-1 code.
    ///
    /// Unknown codes produce an error that lists the supported targets.
    pub fn from_code(code: &str) -> Result<Language> {
        let registry = LanguageRegistry::get();

        match registry.get_by_code(code.trim()) {
            Some(config) if config.enabled => Ok(Language { config }),
            Some(_) => bail!("Language '{}' is not enabled", code),
            None => bail!(
                "Unknown language code: '{}' (supported: {})",
                code,
                registry.target_codes()
            ),
        }
    }

    /// Parse a list of requested codes. An empty list means every target.
    pub fn parse_targets<S: AsRef<str>>(codes: &[S]) -> Result<Vec<Language>> {
        if codes.is_empty() {
            return Ok(Self::targets());
        }

        let mut languages = Vec::with_capacity(codes.len());
        for code in codes {
            let language = Self::from_code(code.as_ref())?;
            if language.is_canonical() {
                bail!(
                    "'{}' is the source language and cannot be a translation target",
                    language.code()
                );
            }
            if !languages.contains(&language) {
                languages.push(language);
            }
        }
        Ok(languages)
    }

    /// Every enabled non-canonical language.
    pub fn targets() -> Vec<Language> {
        LanguageRegistry::get()
            .targets()
            .into_iter()
            .map(|config| Language { config })
            .collect()
    }

    pub fn code(&self) -> &'static str {
        self.config.code
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn native_name(&self) -> &'static str {
        self.config.native_name
    }

    pub fn script(&self) -> Script {
        self.config.script
    }

    pub fn is_canonical(&self) -> bool {
        self.config.is_canonical
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for Language {}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Language").field(&self.code()).finish()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
