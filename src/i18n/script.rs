//! Script and language detection for translated strings.
//!
//! Non-Latin scripts are recognised by Unicode block. Latin-script text is
//! attributed to a language by counting hits against short frequency lists
//! of common function words, plus a few diacritics that only one of the
//! supported languages uses.

/// Writing system a language is normally written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Latin,
    Cyrillic,
    Arabic,
    Devanagari,
    /// Kana mixed with kanji
    Japanese,
    Han,
    Hangul,
}

impl Script {
    pub fn is_latin(&self) -> bool {
        matches!(self, Script::Latin)
    }

    /// Whether `c` counts as evidence of this script.
    pub fn contains(&self, c: char) -> bool {
        match (self, classify(c)) {
            (Script::Japanese, Some(CharClass::Kana | CharClass::Han)) => true,
            (Script::Latin, Some(CharClass::Latin)) => true,
            (Script::Cyrillic, Some(CharClass::Cyrillic)) => true,
            (Script::Arabic, Some(CharClass::Arabic)) => true,
            (Script::Devanagari, Some(CharClass::Devanagari)) => true,
            (Script::Han, Some(CharClass::Han)) => true,
            (Script::Hangul, Some(CharClass::Hangul)) => true,
            _ => false,
        }
    }
}

/// Result of language detection on one string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detected {
    Language(&'static str),
    English,
    /// Too little signal (numbers, symbols, brand names, very short text)
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Latin,
    Cyrillic,
    Arabic,
    Devanagari,
    Kana,
    Han,
    Hangul,
}

fn classify(c: char) -> Option<CharClass> {
    let class = match c as u32 {
        0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F => CharClass::Latin,
        0x0400..=0x04FF | 0x0500..=0x052F => CharClass::Cyrillic,
        0x0600..=0x06FF | 0x0750..=0x077F | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF => {
            CharClass::Arabic
        }
        0x0900..=0x097F => CharClass::Devanagari,
        0x3040..=0x309F | 0x30A0..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9F => CharClass::Kana,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF => CharClass::Han,
        0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F => CharClass::Hangul,
        _ => return None,
    };
    // U+00D7 and U+00F7 sit inside the Latin-1 letter range but are operators
    if c == '×' || c == '÷' {
        return None;
    }
    Some(class)
}

#[derive(Debug, Default)]
struct ScriptCounts {
    latin: usize,
    cyrillic: usize,
    arabic: usize,
    devanagari: usize,
    kana: usize,
    han: usize,
    hangul: usize,
}

impl ScriptCounts {
    fn of(text: &str) -> Self {
        let mut counts = Self::default();
        for c in text.chars() {
            match classify(c) {
                Some(CharClass::Latin) => counts.latin += 1,
                Some(CharClass::Cyrillic) => counts.cyrillic += 1,
                Some(CharClass::Arabic) => counts.arabic += 1,
                Some(CharClass::Devanagari) => counts.devanagari += 1,
                Some(CharClass::Kana) => counts.kana += 1,
                Some(CharClass::Han) => counts.han += 1,
                Some(CharClass::Hangul) => counts.hangul += 1,
                None => {}
            }
        }
        counts
    }

    fn non_latin(&self) -> usize {
        self.cyrillic + self.arabic + self.devanagari + self.kana + self.han + self.hangul
    }

    /// Language of the dominant non-Latin script. Any kana makes the text
    /// Japanese, since Chinese never uses it.
    fn non_latin_language(&self) -> Option<&'static str> {
        if self.kana > 0 {
            return Some("ja");
        }
        [
            (self.hangul, "ko"),
            (self.han, "zh"),
            (self.cyrillic, "ru"),
            (self.arabic, "ar"),
            (self.devanagari, "hi"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .max_by_key(|(count, _)| *count)
        .map(|(_, code)| code)
    }
}

const ENGLISH_WORDS: &[&str] = &[
    "the", "and", "of", "to", "in", "is", "you", "that", "it", "for", "with", "on", "this",
    "are", "your", "be", "as", "at", "by", "from", "or", "have", "an", "was", "will", "can",
    "not", "all", "more", "click", "here", "learn", "about", "our", "we", "get", "use", "how",
    "what", "when", "which", "there", "their", "into", "only", "new", "page", "see",
];

const LATIN_WORD_LISTS: &[(&str, &[&str])] = &[
    (
        "es",
        &[
            "el", "la", "los", "las", "de", "que", "y", "en", "un", "una", "es", "por", "con",
            "para", "del", "su", "al", "lo", "como", "más", "pero", "sus", "este", "esta",
            "también", "puede", "haga", "aquí", "página",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "de", "des", "et", "est", "un", "une", "du", "en", "que", "qui",
            "dans", "pour", "pas", "sur", "avec", "vous", "nous", "ce", "cette", "plus", "sont",
            "ici", "votre", "être",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "ist", "nicht", "ein", "eine", "zu", "den", "mit", "von",
            "sie", "für", "auf", "dem", "des", "auch", "wir", "ihr", "ihre", "oder", "wird",
            "hier", "klicken", "sind", "werden",
        ],
    ),
    (
        "it",
        &[
            "il", "lo", "la", "gli", "le", "di", "che", "e", "è", "un", "una", "per", "non",
            "con", "del", "della", "sono", "questo", "questa", "anche", "qui", "tuo", "nel",
            "clicca", "pagina",
        ],
    ),
    (
        "pt",
        &[
            "o", "os", "as", "de", "que", "e", "do", "da", "em", "um", "uma", "para", "com",
            "não", "por", "mais", "dos", "das", "seu", "sua", "você", "também", "aqui", "está",
            "clique", "página",
        ],
    ),
];

/// Characters that, in this set of languages, only one language uses.
const DISTINCTIVE_LETTERS: &[(char, &str)] = &[
    ('ñ', "es"),
    ('¿', "es"),
    ('¡', "es"),
    ('ß', "de"),
    ('ä', "de"),
    ('ö', "de"),
    ('ü', "de"),
    ('ã', "pt"),
    ('õ', "pt"),
    ('œ', "fr"),
];

pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Detect the dominant language of `text`.
pub fn detect(text: &str) -> Detected {
    let counts = ScriptCounts::of(text);
    let non_latin = counts.non_latin();

    if non_latin > 0 && non_latin * 3 >= counts.latin {
        return counts
            .non_latin_language()
            .map_or(Detected::Unknown, Detected::Language);
    }
    if counts.latin == 0 {
        return Detected::Unknown;
    }
    detect_latin(text)
}

fn detect_latin(text: &str) -> Detected {
    let tokens = words(text);
    if tokens.is_empty() {
        return Detected::Unknown;
    }

    let english = tokens
        .iter()
        .filter(|w| ENGLISH_WORDS.contains(&w.as_str()))
        .count();

    let lowered = text.to_lowercase();
    let best = LATIN_WORD_LISTS
        .iter()
        .map(|(code, list)| {
            let hits = tokens.iter().filter(|w| list.contains(&w.as_str())).count();
            let marks = DISTINCTIVE_LETTERS
                .iter()
                .filter(|(c, lang)| lang == code && lowered.contains(*c))
                .count();
            (*code, hits + marks * 2)
        })
        .max_by_key(|(_, score)| *score);

    match best {
        Some((code, score)) if score > english => Detected::Language(code),
        _ if english > 0 => Detected::English,
        _ => Detected::Unknown,
    }
}

/// Whether a detection result is acceptable for a string in `target`.
///
/// Kanji-only Japanese is indistinguishable from Chinese by block alone.
pub fn is_compatible(detected: Detected, target: &str) -> bool {
    match detected {
        Detected::Unknown | Detected::English => true,
        Detected::Language(code) => code == target || (target == "ja" && code == "zh"),
    }
}

/// Whether `text` contains at least one character of `script`.
pub fn has_script_evidence(text: &str, script: Script) -> bool {
    text.chars().any(|c| script.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Unicode Block Tests ====================

    #[test]
    fn test_detect_non_latin_scripts() {
        assert_eq!(detect("안녕하세요 세계"), Detected::Language("ko"));
        assert_eq!(detect("مرحبا بالعالم"), Detected::Language("ar"));
        assert_eq!(detect("नमस्ते दुनिया"), Detected::Language("hi"));
        assert_eq!(detect("Привет, мир"), Detected::Language("ru"));
        assert_eq!(detect("你好世界"), Detected::Language("zh"));
    }

    #[test]
    fn test_kana_means_japanese() {
        assert_eq!(detect("こんにちは世界"), Detected::Language("ja"));
        assert_eq!(detect("ダウンロード"), Detected::Language("ja"));
    }

    #[test]
    fn test_non_latin_with_brand_names() {
        assert_eq!(detect("GitHub에서 저장소를 복제하세요"), Detected::Language("ko"));
    }

    // ==================== Latin Word List Tests ====================

    #[test]
    fn test_detect_english() {
        assert_eq!(
            detect("Click here to learn more about the project"),
            Detected::English
        );
    }

    #[test]
    fn test_detect_latin_languages() {
        assert_eq!(
            detect("Haga clic aquí para ver la página de inicio"),
            Detected::Language("es")
        );
        assert_eq!(
            detect("Cliquez ici pour voir la page de votre compte"),
            Detected::Language("fr")
        );
        assert_eq!(
            detect("Klicken Sie hier, um die Seite zu öffnen"),
            Detected::Language("de")
        );
    }

    #[test]
    fn test_cedilla_is_not_taken_as_french() {
        assert_eq!(detect("Preço do serviço"), Detected::Language("pt"));
        assert_eq!(detect("Você pode ver"), Detected::Language("pt"));
        assert_eq!(detect("Ce garçon est ici"), Detected::Language("fr"));
    }

    #[test]
    fn test_unknown_for_symbols_and_names() {
        assert_eq!(detect("123 - 456"), Detected::Unknown);
        assert_eq!(detect("Docusaurus"), Detected::Unknown);
        assert_eq!(detect(""), Detected::Unknown);
    }

    // ==================== Compatibility Tests ====================

    #[test]
    fn test_is_compatible() {
        assert!(is_compatible(Detected::Language("ko"), "ko"));
        assert!(is_compatible(Detected::English, "ko"));
        assert!(is_compatible(Detected::Unknown, "ar"));
        assert!(is_compatible(Detected::Language("zh"), "ja"));
        assert!(!is_compatible(Detected::Language("ja"), "zh"));
        assert!(!is_compatible(Detected::Language("es"), "ru"));
    }

    #[test]
    fn test_has_script_evidence() {
        assert!(has_script_evidence("Open the 設定 menu", Script::Japanese));
        assert!(has_script_evidence("Откройте menu", Script::Cyrillic));
        assert!(!has_script_evidence("Open the settings menu", Script::Hangul));
    }

    #[test]
    fn test_words_splits_on_punctuation() {
        assert_eq!(words("Hello, world! It's {name}"), vec!["hello", "world", "it's", "name"]);
    }
}
