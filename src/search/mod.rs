mod index;
mod language;
mod stopwords;
mod tokenizer;

pub use index::{FieldType, IndexedText, LookupError, SearchIndex};
pub use language::{detect_language, Language, LanguageDetector, ScriptDetector};
pub use stopwords::StopWords;
pub use tokenizer::{extract_terms, strip_html, MAX_TERMS_PER_ARTICLE};
