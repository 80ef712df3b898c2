use std::sync::Arc;

use super::stopwords::StopWords;

/// Languages with their own tokenization rules and stop-word tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    English,
    German,
    French,
    Spanish,
    Chinese,
    Russian,
    Italian,
    Portuguese,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::English,
        Language::German,
        Language::French,
        Language::Spanish,
        Language::Chinese,
        Language::Russian,
        Language::Italian,
        Language::Portuguese,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::German => "de",
            Language::French => "fr",
            Language::Spanish => "es",
            Language::Chinese => "zh",
            Language::Russian => "ru",
            Language::Italian => "it",
            Language::Portuguese => "pt",
        }
    }

    /// Maps an ISO 639-1 (or 639-3) code onto a supported language.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "eng" => Some(Language::English),
            "de" | "deu" | "ger" => Some(Language::German),
            "fr" | "fra" | "fre" => Some(Language::French),
            "es" | "spa" => Some(Language::Spanish),
            "zh" | "zho" | "chi" | "cmn" => Some(Language::Chinese),
            "ru" | "rus" => Some(Language::Russian),
            "it" | "ita" => Some(Language::Italian),
            "pt" | "por" => Some(Language::Portuguese),
            _ => None,
        }
    }

    fn is_latin(self) -> bool {
        !matches!(self, Language::Chinese | Language::Russian)
    }
}

/// Identifies the language of a piece of text.
///
/// Returns an ISO 639-1 code, or `None` when the text gives no clear signal.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<String>;
}

/// Detects a supported language, falling back to English.
pub fn detect_language(detector: &dyn LanguageDetector, text: &str) -> Language {
    detector
        .detect(text)
        .and_then(|code| Language::from_code(&code))
        .unwrap_or_default()
}

/// Script and stop-word frequency heuristic.
///
/// Han text is Chinese and Cyrillic text is Russian. Latin text goes to
/// whichever language's stop-words show up most often, provided there are
/// at least two hits.
pub struct ScriptDetector {
    stop_words: Arc<StopWords>,
}

const MIN_STOPWORD_HITS: usize = 2;

impl ScriptDetector {
    pub fn new(stop_words: Arc<StopWords>) -> Self {
        Self { stop_words }
    }
}

impl LanguageDetector for ScriptDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let mut han = 0usize;
        let mut cyrillic = 0usize;
        let mut letters = 0usize;
        for c in text.chars().filter(|c| c.is_alphabetic()) {
            letters += 1;
            if is_han(c) {
                han += 1;
            } else if ('\u{0400}'..='\u{04FF}').contains(&c) {
                cyrillic += 1;
            }
        }
        if letters == 0 {
            return None;
        }
        // Mixed text with a handful of ideographs is still treated as Chinese.
        if han * 5 >= letters {
            return Some(Language::Chinese.code().to_string());
        }
        if cyrillic * 2 >= letters {
            return Some(Language::Russian.code().to_string());
        }

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphabetic() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        let mut best: Option<(Language, usize)> = None;
        for lang in Language::ALL.into_iter().filter(|l| l.is_latin()) {
            let hits = words
                .iter()
                .filter(|w| self.stop_words.contains(lang, w))
                .count();
            // Ties keep the earlier language, which puts English first.
            if hits >= MIN_STOPWORD_HITS && best.map_or(true, |(_, b)| hits > b) {
                best = Some((lang, hits));
            }
        }
        best.map(|(lang, _)| lang.code().to_string())
    }
}

pub(crate) fn is_han(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> ScriptDetector {
        ScriptDetector::new(Arc::new(StopWords::new()))
    }

    #[test]
    fn test_from_code() {
        assert_eq!(Language::from_code("DE"), Some(Language::German));
        assert_eq!(Language::from_code("por"), Some(Language::Portuguese));
        assert_eq!(Language::from_code("xx"), None);
    }

    #[test]
    fn test_detects_scripts() {
        let d = detector();
        assert_eq!(d.detect("人工智能的新突破").as_deref(), Some("zh"));
        assert_eq!(d.detect("Новости рынка и экономики").as_deref(), Some("ru"));
    }

    #[test]
    fn test_detects_latin_languages_by_stopwords() {
        let d = detector();
        assert_eq!(
            d.detect("The market is up and the index was higher than expected").as_deref(),
            Some("en")
        );
        assert_eq!(
            d.detect("Der Markt ist gestiegen und die Anleger sind mit dem Ergebnis zufrieden")
                .as_deref(),
            Some("de")
        );
        assert_eq!(
            d.detect("Le marché est en hausse et les investisseurs sont dans une bonne humeur")
                .as_deref(),
            Some("fr")
        );
    }

    #[test]
    fn test_unknown_falls_back_to_english() {
        let d = detector();
        assert_eq!(d.detect("12345 !!!"), None);
        assert_eq!(detect_language(&d, "xyzzy plugh"), Language::English);
    }
}
