use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::content::{self, normalize_content, should_compress};
use crate::error::{AppError, Result};
use crate::models::{ArticleInput, BatchOutcome};
use crate::search::{IndexedText, SearchIndex};

use super::repository::{
    clean_topic_name, format_datetime, resolve_or_create_topic, touch_topic, Repository,
    TOPIC_SCOPE,
};
use super::schema::SENTINEL_TOPIC_ID;

impl Repository {
    /// Replaces everything `topic` owns with `articles` in one transaction.
    ///
    /// Articles owned by the topic are deleted and its membership rows
    /// dropped before the new list is written. Either the whole replacement
    /// becomes visible or none of it does. Returns the number of articles
    /// written.
    pub async fn save_feed(&self, topic: &str, articles: Vec<ArticleInput>) -> Result<usize> {
        let topic = clean_topic_name(topic)?;
        let expected = articles
            .iter()
            .map(|a| a.id.as_str())
            .collect::<HashSet<_>>()
            .len() as i64;
        let search = self.search.clone();
        let compression_enabled = self.compression_enabled;

        let topic_name = topic.clone();
        let (topic_id, written) = self
            .conn
            .call(move |conn| {
                let now = Utc::now();
                let tx = conn.transaction()?;
                let topic_id = resolve_or_create_topic(&tx, &topic_name, now)?;

                let removed = tx.execute("DELETE FROM articles WHERE topic_id = ?1", params![topic_id])?;
                tx.execute(
                    "DELETE FROM article_topics WHERE topic_id = ?1",
                    params![topic_id],
                )?;

                for article in &articles {
                    if article.id.trim().is_empty() {
                        return Err(tokio_rusqlite::Error::Other(
                            format!("article '{}' has an empty id", article.title).into(),
                        ));
                    }
                    store_article(&tx, &search, article, topic_id, compression_enabled, now)?;
                    link_membership(&tx, &article.id, topic_id, now)?;
                }

                touch_topic(&tx, topic_id, now)?;
                tx.commit()?;
                tracing::debug!(
                    "Replaced topic '{}': removed {} articles, wrote {}",
                    topic_name,
                    removed,
                    articles.len()
                );
                Ok((topic_id, articles.len()))
            })
            .await?;

        self.verify_topic_count(&topic, topic_id, expected).await;
        Ok(written)
    }

    /// Post-commit sanity check. Never fails the caller; the write is
    /// already durable.
    async fn verify_topic_count(&self, topic: &str, topic_id: i64, expected: i64) {
        let counted = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT COUNT(*) FROM articles a WHERE {TOPIC_SCOPE}");
                Ok(conn.query_row(&sql, params![topic_id, topic_id], |row| {
                    row.get::<_, i64>(0)
                })?)
            })
            .await;

        match counted {
            Ok(count) if count == expected => {}
            Ok(count) => tracing::warn!(
                "Topic '{}' holds {} articles after save, expected {}",
                topic,
                count,
                expected
            ),
            Err(e) => tracing::warn!("Could not verify article count for '{}': {}", topic, e),
        }
    }

    /// Upserts articles by id without touching topic membership.
    ///
    /// Each article is written in its own savepoint; a bad record is logged
    /// and counted instead of aborting the batch.
    pub async fn save_articles(&self, articles: Vec<ArticleInput>) -> Result<BatchOutcome> {
        let search = self.search.clone();
        let compression_enabled = self.compression_enabled;

        let outcome = self
            .conn
            .call(move |conn| {
                let now = Utc::now();
                let mut tx = conn.transaction()?;
                let mut outcome = BatchOutcome::default();

                for article in &articles {
                    if article.id.trim().is_empty() {
                        tracing::warn!("Skipping article '{}' with empty id", article.title);
                        outcome.failed += 1;
                        continue;
                    }
                    let sp = tx.savepoint()?;
                    match store_article(
                        &sp,
                        &search,
                        article,
                        SENTINEL_TOPIC_ID,
                        compression_enabled,
                        now,
                    ) {
                        Ok(()) => {
                            sp.commit()?;
                            outcome.succeeded += 1;
                        }
                        Err(e) => {
                            tracing::warn!("Failed to save article {}: {}", article.id, e);
                            outcome.failed += 1;
                        }
                    }
                }

                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        tracing::debug!(
            "Saved {} of {} articles",
            outcome.succeeded,
            outcome.total()
        );
        Ok(outcome)
    }

    /// Adds `article_ids` to `topic`, creating the topic if needed.
    ///
    /// Existing links are left alone. Unknown ids count as failures.
    pub async fn assign_articles_to_topic(
        &self,
        topic: &str,
        article_ids: Vec<String>,
    ) -> Result<BatchOutcome> {
        let topic = clean_topic_name(topic)?;

        let outcome = self
            .conn
            .call(move |conn| {
                let now = Utc::now();
                let mut tx = conn.transaction()?;
                let topic_id = resolve_or_create_topic(&tx, &topic, now)?;
                let mut outcome = BatchOutcome::default();

                for article_id in &article_ids {
                    let sp = tx.savepoint()?;
                    match assign_one(&sp, article_id, topic_id, now) {
                        Ok(true) => {
                            sp.commit()?;
                            outcome.succeeded += 1;
                        }
                        Ok(false) => {
                            tracing::debug!("Cannot assign unknown article {}", article_id);
                            outcome.failed += 1;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Failed to assign article {} to '{}': {}",
                                article_id,
                                topic,
                                e
                            );
                            outcome.failed += 1;
                        }
                    }
                }

                touch_topic(&tx, topic_id, now)?;
                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        Ok(outcome)
    }

    pub async fn add_article_to_topic(&self, article_id: &str, topic: &str) -> Result<()> {
        let topic = clean_topic_name(topic)?;
        let id = article_id.to_string();

        let found = self
            .conn
            .call(move |conn| {
                let now = Utc::now();
                let tx = conn.transaction()?;
                let topic_id = resolve_or_create_topic(&tx, &topic, now)?;
                if !assign_one(&tx, &id, topic_id, now)? {
                    return Ok(false);
                }
                touch_topic(&tx, topic_id, now)?;
                tx.commit()?;
                Ok(true)
            })
            .await?;

        if !found {
            return Err(AppError::NotFound(format!("article '{article_id}'")));
        }
        Ok(())
    }

    /// Unlinks one article from `topic`. If the legacy owner column pointed
    /// at `topic`, it moves to the article's oldest remaining membership, or
    /// back to the sentinel.
    pub async fn remove_article_from_topic(&self, article_id: &str, topic: &str) -> Result<bool> {
        let topic = self.require_topic(topic).await?;
        let id = article_id.to_string();

        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let unlinked = tx.execute(
                    "DELETE FROM article_topics WHERE article_id = ?1 AND topic_id = ?2",
                    params![id, topic.id],
                )?;
                let repointed = tx.execute(
                    "UPDATE articles SET topic_id = COALESCE(
                         (SELECT topic_id FROM article_topics WHERE article_id = ?1 ORDER BY id LIMIT 1),
                         ?3)
                     WHERE article_id = ?1 AND topic_id = ?2",
                    params![id, topic.id, SENTINEL_TOPIC_ID],
                )?;
                tx.commit()?;
                Ok(unlinked + repointed > 0)
            })
            .await?;

        Ok(removed)
    }
}

/// Writes one article with its compressed body and index rows. `topic_id`
/// only takes effect when the stored owner is still the sentinel.
fn store_article(
    conn: &Connection,
    search: &SearchIndex,
    article: &ArticleInput,
    topic_id: i64,
    compression_enabled: bool,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    let cleaned = normalize_content(&article.content);
    let text = IndexedText {
        title: &article.title,
        description: &article.description,
        content: &cleaned,
        author: &article.author,
        source: &article.source,
    };
    let lang = search.detect(&text.detection_text());

    let blob = if should_compress(compression_enabled, article.published_at, &cleaned, now) {
        match content::compress(&cleaned) {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!(
                    "Compression failed for {}, storing inline: {}",
                    article.id,
                    e
                );
                None
            }
        }
    } else {
        None
    };
    let inline = if blob.is_some() { "" } else { cleaned.as_str() };

    let categories = serde_json::to_string(&article.categories)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let now_str = format_datetime(&now);

    conn.execute(
        r#"INSERT INTO articles (article_id, topic_id, title, link, description, content, author,
                                 source, categories, published_at, language, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
           ON CONFLICT(article_id) DO UPDATE SET
               topic_id = CASE WHEN articles.topic_id = 0 THEN excluded.topic_id ELSE articles.topic_id END,
               title = excluded.title,
               link = excluded.link,
               description = excluded.description,
               content = excluded.content,
               author = excluded.author,
               source = excluded.source,
               categories = excluded.categories,
               published_at = excluded.published_at,
               language = excluded.language,
               updated_at = excluded.updated_at"#,
        params![
            article.id,
            topic_id,
            article.title,
            article.link,
            article.description,
            inline,
            article.author,
            article.source,
            categories,
            format_datetime(&article.published_at),
            lang.code(),
            now_str,
        ],
    )?;

    match blob {
        Some(blob) => {
            conn.execute(
                "INSERT OR REPLACE INTO compressed_content (article_id, compressed_content, compressed_at)
                 VALUES (?1, ?2, ?3)",
                params![article.id, blob, now_str],
            )?;
        }
        None => {
            conn.execute(
                "DELETE FROM compressed_content WHERE article_id = ?1",
                params![article.id],
            )?;
        }
    }

    search.index_article(conn, &article.id, &text, lang)?;
    Ok(())
}

fn link_membership(
    conn: &Connection,
    article_id: &str,
    topic_id: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO article_topics (article_id, topic_id, created_at) VALUES (?1, ?2, ?3)",
        params![article_id, topic_id, format_datetime(&now)],
    )?;
    Ok(())
}

/// Links an existing article to a topic. Returns `false` if the article is
/// unknown.
fn assign_one(
    conn: &Connection,
    article_id: &str,
    topic_id: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM articles WHERE article_id = ?1",
            params![article_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        return Ok(false);
    }

    link_membership(conn, article_id, topic_id, now)?;
    conn.execute(
        "UPDATE articles SET topic_id = ?1 WHERE article_id = ?2 AND topic_id = ?3",
        params![topic_id, article_id, SENTINEL_TOPIC_ID],
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::test_support::{article, open_repo};

    async fn legacy_topic_of(repo: &Repository, id: &'static str) -> i64 {
        repo.conn
            .call(move |conn| {
                Ok(conn.query_row(
                    "SELECT topic_id FROM articles WHERE article_id = ?1",
                    params![id],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap()
    }

    async fn index_terms(repo: &Repository, id: &'static str) -> Vec<String> {
        repo.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT search_term FROM search_index WHERE article_id = ?1 ORDER BY search_term",
                )?;
                let terms = stmt
                    .query_map(params![id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(terms)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_feed_replaces_topic_atomically() {
        let (_dir, repo) = open_repo(false).await;
        let now = Utc::now();
        repo.save_feed(
            "tech",
            vec![article("a1", "Alpha", now), article("a2", "Beta", now)],
        )
        .await
        .unwrap();
        repo.save_feed("tech", vec![article("b1", "Gamma", now)])
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .load_feed("tech")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.article_id)
            .collect();
        assert_eq!(ids, vec!["b1"]);
    }

    #[tokio::test]
    async fn test_failed_save_feed_leaves_previous_state() {
        let (_dir, repo) = open_repo(false).await;
        let now = Utc::now();
        repo.save_feed("tech", vec![article("a1", "Alpha", now)])
            .await
            .unwrap();

        let result = repo
            .save_feed(
                "tech",
                vec![article("b1", "Gamma", now), article("  ", "Broken", now)],
            )
            .await;
        assert!(result.is_err());

        let ids: Vec<String> = repo
            .load_feed("tech")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.article_id)
            .collect();
        assert_eq!(ids, vec!["a1"]);
    }

    #[tokio::test]
    async fn test_save_articles_is_idempotent_upsert() {
        let (_dir, repo) = open_repo(false).await;
        let now = Utc::now();
        let mut first = article("a1", "Original headline", now);
        repo.save_articles(vec![first.clone()]).await.unwrap();
        first.content = "Rewritten body".to_string();
        let outcome = repo.save_articles(vec![first]).await.unwrap();
        assert_eq!(outcome, BatchOutcome { succeeded: 1, failed: 0 });

        let count: i64 = repo
            .conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 1);
        let stored = repo.get_article("a1").await.unwrap();
        assert_eq!(stored.content, "Rewritten body");
        assert_eq!(stored.topic, None);
    }

    #[tokio::test]
    async fn test_save_articles_counts_bad_records() {
        let (_dir, repo) = open_repo(false).await;
        let now = Utc::now();
        let outcome = repo
            .save_articles(vec![article("a1", "Fine", now), article("", "No id", now)])
            .await
            .unwrap();
        assert_eq!(outcome, BatchOutcome { succeeded: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_save_articles_rolls_back_failed_row() {
        let (_dir, repo) = open_repo(false).await;
        // Fails the index write, after the article row is already upserted.
        repo.execute_raw(
            "CREATE TRIGGER reject_bad_index BEFORE INSERT ON search_index
             WHEN NEW.article_id = 'bad'
             BEGIN SELECT RAISE(ABORT, 'index rejected'); END;",
        )
        .await
        .unwrap();

        let now = Utc::now();
        let outcome = repo
            .save_articles(vec![article("bad", "Broken row", now), article("good", "Fine row", now)])
            .await
            .unwrap();
        assert_eq!(outcome, BatchOutcome { succeeded: 1, failed: 1 });

        assert!(repo.get_article("bad").await.unwrap_err().is_not_found());
        assert_eq!(repo.get_article("good").await.unwrap().title, "Fine row");
        let (bad_rows, good_rows): (i64, i64) = repo
            .conn
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT SUM(article_id = 'bad'), SUM(article_id = 'good') FROM search_index",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(bad_rows, 0);
        assert!(good_rows > 0);
    }

    #[tokio::test]
    async fn test_old_articles_are_compressed_on_ingest() {
        let (_dir, repo) = open_repo(true).await;
        let old = Utc::now() - Duration::days(10);
        let mut input = article("a1", "Archive piece", old);
        input.content = "  First paragraph.\n\n\n\n\nSecond     paragraph.  ".to_string();
        repo.save_feed("history", vec![input]).await.unwrap();

        let (inline, compressed): (String, i64) = repo
            .conn
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT a.content, (SELECT COUNT(*) FROM compressed_content c WHERE c.article_id = a.article_id)
                     FROM articles a WHERE a.article_id = 'a1'",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(inline, "");
        assert_eq!(compressed, 1);

        let loaded = repo.load_feed("history").await.unwrap();
        assert_eq!(loaded[0].content, "First paragraph.\n\n\nSecond  paragraph.");
    }

    #[tokio::test]
    async fn test_fresh_articles_stay_inline() {
        let (_dir, repo) = open_repo(true).await;
        repo.save_feed("news", vec![article("a1", "Today", Utc::now())])
            .await
            .unwrap();
        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.compressed_articles, 0);
        assert_eq!(stats.uncompressed_articles, 1);
    }

    #[tokio::test]
    async fn test_reindex_drops_old_terms() {
        let (_dir, repo) = open_repo(false).await;
        let now = Utc::now();
        let mut input = article("a1", "Volcano eruption", now);
        input.description = String::new();
        input.content = String::new();
        repo.save_articles(vec![input.clone()]).await.unwrap();
        assert!(index_terms(&repo, "a1").await.contains(&"volcano".to_string()));

        input.title = "Glacier retreat".to_string();
        repo.save_articles(vec![input]).await.unwrap();
        let terms = index_terms(&repo, "a1").await;
        assert!(!terms.contains(&"volcano".to_string()));
        assert!(terms.contains(&"glacier".to_string()));
    }

    #[tokio::test]
    async fn test_assignment_first_topic_wins_legacy_column() {
        let (_dir, repo) = open_repo(false).await;
        let now = Utc::now();
        repo.save_articles(vec![article("a1", "Shared story", now)])
            .await
            .unwrap();
        assert_eq!(legacy_topic_of(&repo, "a1").await, SENTINEL_TOPIC_ID);

        let first = repo
            .assign_articles_to_topic("science", vec!["a1".into(), "ghost".into()])
            .await
            .unwrap();
        assert_eq!(first, BatchOutcome { succeeded: 1, failed: 1 });
        let science = repo.require_topic("science").await.unwrap();
        assert_eq!(legacy_topic_of(&repo, "a1").await, science.id);

        repo.assign_articles_to_topic("climate", vec!["a1".into()])
            .await
            .unwrap();
        repo.assign_articles_to_topic("climate", vec!["a1".into()])
            .await
            .unwrap();
        assert_eq!(legacy_topic_of(&repo, "a1").await, science.id);

        assert_eq!(repo.load_feed("science").await.unwrap().len(), 1);
        assert_eq!(repo.load_feed("climate").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_article_from_topic_repoints_legacy_owner() {
        let (_dir, repo) = open_repo(false).await;
        let now = Utc::now();
        repo.save_articles(vec![article("a1", "Shared story", now)])
            .await
            .unwrap();
        repo.add_article_to_topic("a1", "science").await.unwrap();
        repo.add_article_to_topic("a1", "climate").await.unwrap();

        assert!(repo.remove_article_from_topic("a1", "science").await.unwrap());
        let climate = repo.require_topic("climate").await.unwrap();
        assert_eq!(legacy_topic_of(&repo, "a1").await, climate.id);

        assert!(repo.remove_article_from_topic("a1", "climate").await.unwrap());
        assert_eq!(legacy_topic_of(&repo, "a1").await, SENTINEL_TOPIC_ID);
        assert!(!repo.remove_article_from_topic("a1", "climate").await.unwrap());

        let err = repo.add_article_to_topic("missing", "climate").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
