use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::language::Language;
use super::stopwords::StopWords;

/// Upper bound on index terms kept for one article, across all its fields.
pub const MAX_TERMS_PER_ARTICLE: usize = 100;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));
static HAN_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Han}{2,}").expect("valid regex"));
static LATIN_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]{3,}").expect("valid regex"));

pub fn strip_html(text: &str) -> String {
    HTML_TAG.replace_all(text, " ").into_owned()
}

/// Extracts the distinct, lowercased search terms of `text` in first-seen
/// order.
pub fn extract_terms(text: &str, lang: Language, stop_words: &StopWords) -> Vec<String> {
    let raw = match lang {
        Language::Chinese => ideographic_tokens(text),
        _ => word_tokens(text),
    };

    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|t| t.chars().count() > 2 || (lang == Language::Chinese && is_han_run(t)))
        .filter(|t| !stop_words.contains(lang, t))
        .take(MAX_TERMS_PER_ARTICLE)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn word_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let stripped = strip_html(&lowered);
    let cleaned = NON_WORD.replace_all(&stripped, " ");
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn ideographic_tokens(text: &str) -> Vec<String> {
    let stripped = strip_html(text);
    let mut tokens: Vec<String> = HAN_RUN
        .find_iter(&stripped)
        .map(|m| m.as_str().to_string())
        .collect();
    tokens.extend(
        LATIN_RUN
            .find_iter(&stripped)
            .map(|m| m.as_str().to_lowercase()),
    );
    tokens
}

fn is_han_run(token: &str) -> bool {
    token.chars().count() >= 2 && token.chars().all(super::language::is_han)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_tokens_are_cleaned() {
        let sw = StopWords::new();
        let terms = extract_terms(
            "<p>The <b>AI</b> Breakthrough: machine-learning, at scale!</p>",
            Language::English,
            &sw,
        );
        assert_eq!(terms, vec!["breakthrough", "machine", "learning", "scale"]);
    }

    #[test]
    fn test_terms_are_distinct() {
        let sw = StopWords::new();
        let terms = extract_terms("rust Rust RUST cargo", Language::English, &sw);
        assert_eq!(terms, vec!["rust", "cargo"]);
    }

    #[test]
    fn test_german_stopwords_removed() {
        let sw = StopWords::new();
        let terms = extract_terms("Die Regierung und der Markt", Language::German, &sw);
        assert_eq!(terms, vec!["regierung", "markt"]);
    }

    #[test]
    fn test_chinese_runs_and_latin_runs() {
        let sw = StopWords::new();
        let terms = extract_terms("<div>人工智能 新 突破 OpenAI 发布 GPT</div>", Language::Chinese, &sw);
        assert!(terms.contains(&"人工智能".to_string()));
        assert!(terms.contains(&"突破".to_string()));
        assert!(terms.contains(&"发布".to_string()));
        assert!(terms.contains(&"openai".to_string()));
        assert!(terms.contains(&"gpt".to_string()));
        assert!(!terms.contains(&"新".to_string()));
        assert!(!terms.iter().any(|t| t.contains('<')));
    }

    #[test]
    fn test_term_cap() {
        let sw = StopWords::new();
        let text: String = (0..250).map(|i| format!("word{i} ")).collect();
        let terms = extract_terms(&text, Language::English, &sw);
        assert_eq!(terms.len(), MAX_TERMS_PER_ARTICLE);
        assert_eq!(terms[0], "word0");
    }
}
