use chrono::{Duration, Utc};
use rusqlite::params;

use crate::content::{self, freshness_cutoff, SWEEP_BATCH_SIZE};
use crate::error::{AppError, Result};
use crate::models::{SourceStats, StoreStats, TopicCount};

use super::repository::{datetime_column, format_datetime, Repository};
use super::schema::SENTINEL_TOPIC_ID;

impl Repository {
    /// Deletes a topic, the articles it owns and all of its membership rows.
    pub async fn delete_topic(&self, topic: &str) -> Result<()> {
        let _guard = self.maintenance_lock.lock().await;
        let topic = self.require_topic(topic).await?;
        let topic_id = topic.id;

        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let articles = tx.execute(
                    "DELETE FROM articles WHERE topic_id = ?1",
                    params![topic_id],
                )?;
                tx.execute("DELETE FROM topics WHERE id = ?1", params![topic_id])?;
                tx.commit()?;
                Ok(articles)
            })
            .await?;

        tracing::info!("Deleted topic '{}' with {} articles", topic.name, removed);
        Ok(())
    }

    /// Deletes articles published before `now - retention`, across all
    /// topics. Returns the number removed.
    pub async fn cleanup_old_articles(&self, retention: Duration) -> Result<usize> {
        if retention <= Duration::zero() {
            return Err(AppError::InvalidInput(
                "retention window must be positive".into(),
            ));
        }
        let _guard = self.maintenance_lock.lock().await;
        let cutoff = format_datetime(&(Utc::now() - retention));

        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute(
                    "DELETE FROM articles WHERE published_at < ?1",
                    params![cutoff],
                )?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;

        tracing::info!("Retention cleanup removed {} articles", removed);
        Ok(removed)
    }

    /// Keeps the oldest row for every distinct non-empty link and deletes
    /// the rest. Articles with an empty link are never duplicates. Returns
    /// the number removed.
    pub async fn remove_duplicates(&self) -> Result<usize> {
        let _guard = self.maintenance_lock.lock().await;

        let removed = self
            .conn
            .call(|conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute(
                    "DELETE FROM articles
                     WHERE link != ''
                       AND id NOT IN (SELECT MIN(id) FROM articles WHERE link != '' GROUP BY link)",
                    [],
                )?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;

        tracing::info!("Removed {} duplicate articles", removed);
        Ok(removed)
    }

    /// Reclaims free pages and refreshes planner statistics.
    pub async fn compact(&self) -> Result<()> {
        let _guard = self.maintenance_lock.lock().await;
        self.conn
            .call(|conn| {
                conn.execute_batch("VACUUM; ANALYZE;")?;
                Ok(())
            })
            .await?;
        tracing::info!("Compacted database at {}", self.path().display());
        Ok(())
    }

    /// Moves stale inline bodies into `compressed_content`, at most one
    /// batch per call. A row's inline copy is cleared only after its blob is
    /// written. Returns the number of rows compressed.
    pub async fn compress_old_articles(&self) -> Result<usize> {
        if !self.compression_enabled {
            return Ok(0);
        }
        let cutoff = format_datetime(&freshness_cutoff(Utc::now()));

        let compressed = self
            .conn
            .call(move |conn| {
                let now = format_datetime(&Utc::now());
                let mut tx = conn.transaction()?;

                let candidates: Vec<(String, String)> = {
                    let mut stmt = tx.prepare(
                        "SELECT a.article_id, a.content FROM articles a
                         WHERE a.published_at < ?1
                           AND a.content != ''
                           AND NOT EXISTS (SELECT 1 FROM compressed_content cc
                                           WHERE cc.article_id = a.article_id)
                         ORDER BY a.published_at ASC
                         LIMIT ?2",
                    )?;
                    let rows = stmt
                        .query_map(params![cutoff, SWEEP_BATCH_SIZE as i64], |row| {
                            Ok((row.get(0)?, row.get(1)?))
                        })?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                };

                let mut compressed = 0;
                for (article_id, body) in candidates {
                    let blob = match content::compress(&body) {
                        Ok(blob) => blob,
                        Err(e) => {
                            tracing::warn!("Skipping compression of {}: {}", article_id, e);
                            continue;
                        }
                    };
                    let sp = tx.savepoint()?;
                    let written = sp
                        .execute(
                            "INSERT INTO compressed_content (article_id, compressed_content, compressed_at)
                             VALUES (?1, ?2, ?3)",
                            params![article_id, blob, now],
                        )
                        .and_then(|_| {
                            sp.execute(
                                "UPDATE articles SET content = '' WHERE article_id = ?1",
                                params![article_id],
                            )
                        });
                    match written {
                        Ok(_) => {
                            sp.commit()?;
                            compressed += 1;
                        }
                        Err(e) => {
                            tracing::warn!("Skipping compression of {}: {}", article_id, e);
                        }
                    }
                }

                tx.commit()?;
                Ok(compressed)
            })
            .await?;

        if compressed > 0 {
            tracing::info!("Compressed {} article bodies", compressed);
        }
        Ok(compressed)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.conn
            .call(|conn| {
                let count = |sql: &str| conn.query_row(sql, [], |row| row.get::<_, i64>(0));

                let total_articles = count("SELECT COUNT(*) FROM articles")?;
                let total_topics = conn.query_row(
                    "SELECT COUNT(*) FROM topics WHERE id != ?1",
                    params![SENTINEL_TOPIC_ID],
                    |row| row.get(0),
                )?;
                let compressed_articles = count("SELECT COUNT(*) FROM compressed_content")?;
                let uncompressed_articles = count(
                    "SELECT COUNT(*) FROM articles a WHERE NOT EXISTS
                        (SELECT 1 FROM compressed_content cc WHERE cc.article_id = a.article_id)",
                )?;
                let avg_content_size: f64 = conn.query_row(
                    "SELECT COALESCE(AVG(LENGTH(content)), 0.0) FROM articles WHERE content != ''",
                    [],
                    |row| row.get(0),
                )?;
                let page_count = count("PRAGMA page_count")?;
                let page_size = count("PRAGMA page_size")?;

                let mut stmt = conn.prepare(
                    "SELECT source, COUNT(*),
                            SUM(CASE WHEN language != 'en' THEN 1 ELSE 0 END),
                            MIN(published_at), MAX(published_at)
                     FROM articles GROUP BY source ORDER BY COUNT(*) DESC, source",
                )?;
                let sources = stmt
                    .query_map([], |row| {
                        let has_rows = row.get::<_, Option<String>>(3)?.is_some();
                        Ok(SourceStats {
                            source: row.get(0)?,
                            article_count: row.get(1)?,
                            non_english_count: row.get(2)?,
                            oldest: if has_rows { Some(datetime_column(row, 3)?) } else { None },
                            newest: if has_rows { Some(datetime_column(row, 4)?) } else { None },
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut stmt = conn.prepare(
                    "SELECT t.name,
                            (SELECT COUNT(*) FROM articles a
                             WHERE a.topic_id = t.id
                                OR EXISTS (SELECT 1 FROM article_topics mt
                                           WHERE mt.article_id = a.article_id AND mt.topic_id = t.id))
                     FROM topics t WHERE t.id != ?1 ORDER BY t.name",
                )?;
                let topics = stmt
                    .query_map(params![SENTINEL_TOPIC_ID], |row| {
                        Ok(TopicCount {
                            topic: row.get(0)?,
                            article_count: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                Ok(StoreStats {
                    total_articles,
                    total_topics,
                    compressed_articles,
                    uncompressed_articles,
                    avg_content_size,
                    db_size_bytes: page_count * page_size,
                    sources,
                    topics,
                })
            })
            .await
            .map_err(AppError::from)
    }
}
