use std::collections::HashSet;
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use thiserror::Error;

use super::language::{detect_language, Language, LanguageDetector, ScriptDetector};
use super::stopwords::StopWords;
use super::tokenizer::{extract_terms, MAX_TERMS_PER_ARTICLE};

/// Article fields that feed the inverted index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Title,
    Description,
    Content,
    Author,
    Source,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Title => "title",
            FieldType::Description => "description",
            FieldType::Content => "content",
            FieldType::Author => "author",
            FieldType::Source => "source",
        }
    }
}

/// The text of one article, borrowed per indexed field.
#[derive(Debug, Clone, Copy)]
pub struct IndexedText<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub content: &'a str,
    pub author: &'a str,
    pub source: &'a str,
}

impl<'a> IndexedText<'a> {
    fn fields(&self) -> [(FieldType, &'a str); 5] {
        [
            (FieldType::Title, self.title),
            (FieldType::Description, self.description),
            (FieldType::Content, self.content),
            (FieldType::Author, self.author),
            (FieldType::Source, self.source),
        ]
    }

    /// Text used for language detection.
    pub fn detection_text(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.content)
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("search term '{0}' has no indexable tokens")]
    Unindexable(String),

    #[error("search index query failed: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Hand-built inverted index stored in the `search_index` table.
///
/// Callers go through three steps: detect a language, index an article,
/// look up terms. A native full-text engine could replace this type without
/// changing them.
#[derive(Clone)]
pub struct SearchIndex {
    detector: Arc<dyn LanguageDetector>,
    stop_words: Arc<StopWords>,
}

impl SearchIndex {
    pub fn new(detector: Arc<dyn LanguageDetector>, stop_words: Arc<StopWords>) -> Self {
        Self {
            detector,
            stop_words,
        }
    }

    pub fn stop_words(&self) -> Arc<StopWords> {
        Arc::clone(&self.stop_words)
    }

    pub fn detect(&self, text: &str) -> Language {
        detect_language(self.detector.as_ref(), text)
    }

    pub fn terms(&self, text: &str, lang: Language) -> Vec<String> {
        extract_terms(text, lang, &self.stop_words)
    }

    /// Replaces every index row of `article_id`. Fields are indexed in order
    /// until the article's term budget is spent. Returns the number of rows
    /// written.
    pub fn index_article(
        &self,
        conn: &Connection,
        article_id: &str,
        text: &IndexedText<'_>,
        lang: Language,
    ) -> rusqlite::Result<usize> {
        conn.execute(
            "DELETE FROM search_index WHERE article_id = ?1",
            params![article_id],
        )?;

        let mut stmt = conn.prepare_cached(
            "INSERT INTO search_index (article_id, search_term, field_type, language, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let now = crate::db::format_datetime(&chrono::Utc::now());
        let mut written = 0;
        'fields: for (field, value) in text.fields() {
            if value.trim().is_empty() {
                continue;
            }
            for term in self.terms(value, lang) {
                if written == MAX_TERMS_PER_ARTICLE {
                    break 'fields;
                }
                stmt.execute(params![article_id, term, field.as_str(), lang.code(), now])?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Finds articles matching any of `terms`, newest first per term.
    ///
    /// The detected language of the query is tried first. If that returns
    /// nothing, every language is searched. `topic_id` limits the result to
    /// one topic.
    pub fn lookup(
        &self,
        conn: &Connection,
        terms: &[String],
        topic_id: Option<i64>,
    ) -> Result<Vec<String>, LookupError> {
        let lang = self.detect(&terms.join(" "));

        let mut tokens = Vec::new();
        for term in terms {
            let extracted = self.terms(term, lang);
            if extracted.is_empty() {
                return Err(LookupError::Unindexable(term.clone()));
            }
            tokens.extend(extracted);
        }

        let hits = self.query_tokens(conn, &tokens, Some(lang), topic_id)?;
        if !hits.is_empty() {
            return Ok(hits);
        }
        tracing::debug!(
            "No '{}' index hits for {:?}, retrying across languages",
            lang.code(),
            terms
        );
        Ok(self.query_tokens(conn, &tokens, None, topic_id)?)
    }

    fn query_tokens(
        &self,
        conn: &Connection,
        tokens: &[String],
        lang: Option<Language>,
        topic_id: Option<i64>,
    ) -> rusqlite::Result<Vec<String>> {
        let mut sql = String::from(
            "SELECT DISTINCT si.article_id, a.published_at
             FROM search_index si
             JOIN articles a ON a.article_id = si.article_id
             WHERE si.search_term = ?",
        );
        if lang.is_some() {
            sql.push_str(" AND si.language = ?");
        }
        if topic_id.is_some() {
            sql.push_str(" AND ");
            sql.push_str(crate::db::TOPIC_SCOPE);
        }
        sql.push_str(" ORDER BY a.published_at DESC");

        let mut stmt = conn.prepare(&sql)?;
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for token in tokens {
            let mut values = vec![Value::Text(token.clone())];
            if let Some(lang) = lang {
                values.push(Value::Text(lang.code().to_string()));
            }
            if let Some(id) = topic_id {
                values.push(Value::Integer(id));
                values.push(Value::Integer(id));
            }
            let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;
            for id in rows {
                let id = id?;
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
}

impl Default for SearchIndex {
    fn default() -> Self {
        let stop_words = Arc::new(StopWords::new());
        let detector = Arc::new(ScriptDetector::new(Arc::clone(&stop_words)));
        Self::new(detector, stop_words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::SCHEMA;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        for (id, published) in [("a1", "2026-01-02T00:00:00.000Z"), ("a2", "2026-01-01T00:00:00.000Z")] {
            conn.execute(
                "INSERT INTO articles (article_id, topic_id, title, link, published_at, created_at, updated_at)
                 VALUES (?1, 0, '', '', ?2, ?2, ?2)",
                params![id, published],
            )
            .unwrap();
        }
        conn
    }

    fn text<'a>(title: &'a str, content: &'a str) -> IndexedText<'a> {
        IndexedText {
            title,
            description: "",
            content,
            author: "",
            source: "",
        }
    }

    #[test]
    fn test_reindex_replaces_rows() {
        let conn = setup();
        let index = SearchIndex::default();
        index
            .index_article(&conn, "a1", &text("Quantum computing", ""), Language::English)
            .unwrap();
        index
            .index_article(&conn, "a1", &text("Solar energy", ""), Language::English)
            .unwrap();

        let terms: Vec<String> = conn
            .prepare("SELECT search_term FROM search_index WHERE article_id = 'a1' ORDER BY search_term")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(terms, vec!["energy", "solar"]);
    }

    #[test]
    fn test_term_budget_spans_all_fields() {
        let conn = setup();
        let index = SearchIndex::default();
        let words = |prefix: &str| -> String {
            (0..90).map(|i| format!("{prefix}{i} ")).collect()
        };
        let (title, description, content) = (words("tword"), words("dword"), words("cword"));
        let (author, source) = (words("aword"), words("sword"));
        let text = IndexedText {
            title: &title,
            description: &description,
            content: &content,
            author: &author,
            source: &source,
        };

        let written = index
            .index_article(&conn, "a1", &text, Language::English)
            .unwrap();
        assert_eq!(written, MAX_TERMS_PER_ARTICLE);

        let (rows, titles, descriptions): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*),
                        SUM(field_type = 'title'),
                        SUM(field_type = 'description')
                 FROM search_index WHERE article_id = 'a1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(rows, MAX_TERMS_PER_ARTICLE as i64);
        assert_eq!(titles, 90);
        assert_eq!(descriptions, 10);
    }

    #[test]
    fn test_lookup_unions_terms_newest_first() {
        let conn = setup();
        let index = SearchIndex::default();
        index
            .index_article(&conn, "a1", &text("Solar panels", ""), Language::English)
            .unwrap();
        index
            .index_article(&conn, "a2", &text("Wind turbines", "solar too"), Language::English)
            .unwrap();

        let ids = index
            .lookup(&conn, &["wind".to_string(), "solar".to_string()], None)
            .unwrap();
        assert_eq!(ids, vec!["a2", "a1"]);
    }

    #[test]
    fn test_lookup_falls_back_across_languages() {
        let conn = setup();
        let index = SearchIndex::default();
        index
            .index_article(&conn, "a1", &text("Bundestag Haushalt", ""), Language::German)
            .unwrap();

        let ids = index.lookup(&conn, &["haushalt".to_string()], None).unwrap();
        assert_eq!(ids, vec!["a1"]);
    }

    #[test]
    fn test_lookup_rejects_unindexable_terms() {
        let conn = setup();
        let index = SearchIndex::default();
        let err = index.lookup(&conn, &["AI".to_string()], None).unwrap_err();
        assert!(matches!(err, LookupError::Unindexable(_)));
    }
}
