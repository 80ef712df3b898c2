use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio::sync::Mutex;
use tokio_rusqlite::Connection;

use crate::config::Config;
use crate::content;
use crate::error::{AppError, Result};
use crate::models::{Article, Topic};
use crate::search::{LanguageDetector, SearchIndex};

use super::schema::{self, SCHEMA, SENTINEL_TOPIC_ID, SENTINEL_TOPIC_NAME};

/// Topic name lookups.
pub(crate) const TOPIC_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Bulk article scans.
pub(crate) const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Matches articles in one topic, through either the membership table or the
/// legacy owner column. Binds the topic id twice.
pub(crate) const TOPIC_SCOPE: &str = "(a.topic_id = ? OR EXISTS (SELECT 1 FROM article_topics mt \
     WHERE mt.article_id = a.article_id AND mt.topic_id = ?))";

/// Column list read by [`article_from_row`].
pub(crate) const ARTICLE_SELECT: &str = r#"SELECT a.id, a.article_id,
       COALESCE(NULLIF(t.name, '__unassigned__'),
                (SELECT t2.name FROM article_topics mt2 JOIN topics t2 ON t2.id = mt2.topic_id
                 WHERE mt2.article_id = a.article_id ORDER BY mt2.id LIMIT 1)) AS topic_name,
       a.title, a.link, a.description, a.content, a.author, a.source, a.categories,
       a.published_at, a.language, a.created_at, a.updated_at, cc.compressed_content
FROM articles a
LEFT JOIN topics t ON t.id = a.topic_id
LEFT JOIN compressed_content cc ON cc.article_id = a.article_id"#;

/// Persistent article store.
///
/// All access goes through a single SQLite connection owned by
/// `tokio_rusqlite`, so writes are serialized. Each write runs in a
/// transaction that rolls back when dropped uncommitted.
pub struct Repository {
    pub(super) conn: Connection,
    pub(super) search: SearchIndex,
    pub(super) compression_enabled: bool,
    /// Held by destructive maintenance and topic deletion.
    pub(super) maintenance_lock: Mutex<()>,
    path: PathBuf,
}

impl Repository {
    pub async fn new(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::open(
            config.db_path(),
            config.force_rebuild,
            config.compression_enabled,
        )
        .await
    }

    pub async fn open(
        db_path: impl AsRef<Path>,
        force_rebuild: bool,
        compression_enabled: bool,
    ) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        let check_path = path.clone();
        tokio::task::spawn_blocking(move || schema::prepare_store(&check_path, force_rebuild))
            .await
            .map_err(|e| anyhow::anyhow!("schema check task failed: {e}"))??;

        let conn = Connection::open(&path).await?;
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        tracing::debug!("Opened article store at {}", path.display());

        Ok(Self {
            conn,
            search: SearchIndex::default(),
            compression_enabled,
            maintenance_lock: Mutex::new(()),
            path,
        })
    }

    /// Replaces the language detector used for indexing and search.
    pub fn with_language_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.search = SearchIndex::new(detector, self.search.stop_words());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression_enabled(&self) -> bool {
        self.compression_enabled
    }

    pub(super) async fn call_with_timeout<F, R>(&self, limit: Duration, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        tokio::time::timeout(limit, self.conn.call(function))
            .await
            .map_err(AppError::timed_out)?
            .map_err(AppError::from)
    }

    /// Looks up a topic by name. The sentinel topic is never returned.
    pub(super) async fn find_topic(&self, name: &str) -> Result<Option<Topic>> {
        let name = name.trim().to_string();
        if name.is_empty() || name == SENTINEL_TOPIC_NAME {
            return Ok(None);
        }
        self.call_with_timeout(TOPIC_LOOKUP_TIMEOUT, move |conn| {
            Ok(topic_by_name(conn, &name)?)
        })
        .await
    }

    pub(super) async fn require_topic(&self, name: &str) -> Result<Topic> {
        self.find_topic(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("topic '{}'", name.trim())))
    }

    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Validates a caller-supplied topic name.
pub(super) fn clean_topic_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("topic name cannot be empty".into()));
    }
    if name == SENTINEL_TOPIC_NAME {
        return Err(AppError::InvalidInput(format!(
            "topic name '{SENTINEL_TOPIC_NAME}' is reserved"
        )));
    }
    Ok(name.to_string())
}

pub(super) fn topic_by_name(
    conn: &rusqlite::Connection,
    name: &str,
) -> rusqlite::Result<Option<Topic>> {
    conn.query_row(
        "SELECT id, name, created_at, updated_at FROM topics WHERE name = ?1 AND id != ?2",
        params![name, SENTINEL_TOPIC_ID],
        topic_from_row,
    )
    .optional()
}

/// Returns the id of topic `name`, creating it when absent.
pub(super) fn resolve_or_create_topic(
    conn: &rusqlite::Connection,
    name: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    if let Some(topic) = topic_by_name(conn, name)? {
        return Ok(topic.id);
    }
    let now = format_datetime(&now);
    conn.execute(
        "INSERT INTO topics (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
        params![name, now],
    )?;
    tracing::debug!("Created topic '{}'", name);
    Ok(conn.last_insert_rowid())
}

pub(super) fn touch_topic(
    conn: &rusqlite::Connection,
    topic_id: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE topics SET updated_at = ?1 WHERE id = ?2",
        params![format_datetime(&now), topic_id],
    )?;
    Ok(())
}

/// Fixed-width UTC timestamps, so text order matches time order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite's CURRENT_TIMESTAMP layout
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

pub(super) fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp '{raw}'").into(),
        )
    })
}

pub(super) fn topic_from_row(row: &Row) -> rusqlite::Result<Topic> {
    Ok(Topic {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: datetime_column(row, 2)?,
        updated_at: datetime_column(row, 3)?,
    })
}

/// Reads a row selected with [`ARTICLE_SELECT`], inflating compressed bodies.
pub(super) fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let article_id: String = row.get(1)?;
    let categories: String = row.get(9)?;
    let inline: String = row.get(6)?;
    let blob: Option<Vec<u8>> = row.get(14)?;
    let content = content::resolve_body(&article_id, inline, blob);

    Ok(Article {
        row_id: row.get(0)?,
        topic: row.get(2)?,
        title: row.get(3)?,
        link: row.get(4)?,
        description: row.get(5)?,
        content,
        author: row.get(7)?,
        source: row.get(8)?,
        categories: parse_categories(&article_id, &categories),
        published_at: datetime_column(row, 10)?,
        language: row.get(11)?,
        created_at: datetime_column(row, 12)?,
        updated_at: datetime_column(row, 13)?,
        article_id,
    })
}

/// A malformed category list reads as empty rather than failing the row.
fn parse_categories(article_id: &str, raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Ignoring malformed categories for {}: {}", article_id, e);
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_format_is_sortable() {
        let early = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = early + chrono::Duration::milliseconds(1500);
        let (a, b) = (format_datetime(&early), format_datetime(&late));
        assert_eq!(a, "2026-01-02T03:04:05.000Z");
        assert!(a < b);
        assert_eq!(parse_datetime(&b), Some(late));
    }

    #[test]
    fn test_parse_sqlite_datetime() {
        assert!(parse_datetime("2026-01-11 12:34:56").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_parse_categories() {
        assert_eq!(parse_categories("a1", r#"["rust","db"]"#), vec!["rust", "db"]);
        assert!(parse_categories("a1", "not json").is_empty());
    }

    #[tokio::test]
    async fn test_malformed_categories_do_not_hide_article() {
        let (_dir, repo) = crate::db::test_support::open_repo(false).await;
        repo.save_articles(vec![crate::db::test_support::article("c1", "Tagged", Utc::now())])
            .await
            .unwrap();
        repo.execute_raw("UPDATE articles SET categories = '{broken' WHERE article_id = 'c1'")
            .await
            .unwrap();

        let stored = repo.get_article("c1").await.unwrap();
        assert_eq!(stored.title, "Tagged");
        assert!(stored.categories.is_empty());
    }

    #[test]
    fn test_clean_topic_name() {
        assert_eq!(clean_topic_name("  tech ").unwrap(), "tech");
        assert!(clean_topic_name("   ").is_err());
        assert!(clean_topic_name(SENTINEL_TOPIC_NAME).is_err());
    }

    #[tokio::test]
    async fn test_open_creates_schema_and_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path().join("feeds.db"), false, true)
            .await
            .unwrap();
        assert!(repo.path().exists());
        assert!(repo.find_topic(SENTINEL_TOPIC_NAME).await.unwrap().is_none());
        assert!(repo.find_topic("missing").await.unwrap().is_none());
    }
}
