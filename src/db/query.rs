use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::error::{AppError, Result};
use crate::models::{Article, ArticleQuery, FeedInfo, QueryResult, Topic};
use crate::search::SearchIndex;

use super::repository::{
    article_from_row, format_datetime, topic_from_row, Repository, ARTICLE_SELECT, SCAN_TIMEOUT,
    TOPIC_LOOKUP_TIMEOUT, TOPIC_SCOPE,
};
use super::schema::SENTINEL_TOPIC_ID;

const DEFAULT_ORDER: &str = "a.published_at DESC, a.id DESC";

/// Fields searched by the substring fallback of `$search`.
const SEARCH_COLUMNS: [&str; 5] = ["a.title", "a.description", "a.content", "a.author", "a.source"];
/// Fields matched by the free-text `filter`.
const FILTER_COLUMNS: [&str; 4] = ["a.title", "a.description", "a.content", "a.author"];

impl Repository {
    /// All articles of `topic`, newest first. An unknown topic and an empty
    /// one both yield `NotFound`.
    pub async fn load_feed(&self, topic: &str) -> Result<Vec<Article>> {
        let topic = self.require_topic(topic).await?;
        let topic_id = topic.id;

        let articles = self
            .call_with_timeout(SCAN_TIMEOUT, move |conn| {
                let sql = format!("{ARTICLE_SELECT} WHERE {TOPIC_SCOPE} ORDER BY {DEFAULT_ORDER}");
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(params![topic_id, topic_id], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;

        if articles.is_empty() {
            return Err(AppError::NotFound(format!(
                "no articles for topic '{}'",
                topic.name
            )));
        }
        Ok(with_topic(articles, &topic.name))
    }

    /// Runs `query` against one topic.
    pub async fn query_articles(&self, topic: &str, query: &ArticleQuery) -> Result<Vec<Article>> {
        let topic = self.require_topic(topic).await?;
        let result = self.run_query(query.clone(), Some(topic.id), false).await?;
        Ok(with_topic(result.articles, &topic.name))
    }

    /// Runs `query` against one topic, with a total count for paging.
    pub async fn get_topic_articles(&self, topic: &str, query: &ArticleQuery) -> Result<QueryResult> {
        let topic = self.require_topic(topic).await?;
        let mut result = self.run_query(query.clone(), Some(topic.id), true).await?;
        result.articles = with_topic(result.articles, &topic.name);
        Ok(result)
    }

    /// Runs `query` across every topic, with a total count for paging.
    pub async fn get_all_articles(&self, query: &ArticleQuery) -> Result<QueryResult> {
        self.run_query(query.clone(), None, true).await
    }

    pub async fn get_article(&self, article_id: &str) -> Result<Article> {
        let id = article_id.to_string();
        let article = self
            .call_with_timeout(TOPIC_LOOKUP_TIMEOUT, move |conn| {
                let sql = format!("{ARTICLE_SELECT} WHERE a.article_id = ?1");
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query_map(params![id], article_from_row)?;
                Ok(rows.next().transpose()?)
            })
            .await?;
        article.ok_or_else(|| AppError::NotFound(format!("article '{article_id}'")))
    }

    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        self.call_with_timeout(TOPIC_LOOKUP_TIMEOUT, |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, created_at, updated_at FROM topics WHERE id != ?1 ORDER BY name",
            )?;
            let topics = stmt
                .query_map(params![SENTINEL_TOPIC_ID], topic_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(topics)
        })
        .await
    }

    pub async fn get_feed_info(&self, topic: &str) -> Result<FeedInfo> {
        let topic = self.require_topic(topic).await?;
        let topic_id = topic.id;
        let article_count = self
            .call_with_timeout(SCAN_TIMEOUT, move |conn| {
                let sql = format!("SELECT COUNT(*) FROM articles a WHERE {TOPIC_SCOPE}");
                Ok(conn.query_row(&sql, params![topic_id, topic_id], |row| row.get(0))?)
            })
            .await?;

        Ok(FeedInfo {
            topic: topic.name,
            size: 0,
            last_modified: topic.updated_at,
            article_count,
        })
    }

    async fn run_query(
        &self,
        query: ArticleQuery,
        topic_id: Option<i64>,
        with_count: bool,
    ) -> Result<QueryResult> {
        let search = self.search.clone();
        self.call_with_timeout(SCAN_TIMEOUT, move |conn| {
            Ok(execute_query(conn, &search, &query, topic_id, with_count)?)
        })
        .await
    }
}

/// In a topic-scoped read, every row belongs to the requested topic.
fn with_topic(mut articles: Vec<Article>, topic: &str) -> Vec<Article> {
    for article in &mut articles {
        article.topic = Some(topic.to_string());
    }
    articles
}

/// WHERE clauses and their bound values, in placeholder order.
#[derive(Debug, Default)]
struct Predicates {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Predicates {
    fn push(&mut self, clause: impl Into<String>, values: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.values.extend(values);
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// Translates `query` into SQL and runs it.
fn execute_query(
    conn: &Connection,
    search: &SearchIndex,
    query: &ArticleQuery,
    topic_id: Option<i64>,
    with_count: bool,
) -> rusqlite::Result<QueryResult> {
    let Some(predicates) = build_predicates(conn, search, query, topic_id)? else {
        return Ok(QueryResult::default());
    };

    let where_sql = predicates.where_sql();
    let mut sql = format!(
        "{ARTICLE_SELECT}{where_sql} ORDER BY {}",
        order_clause(query.order_by.as_deref())
    );
    let mut values = predicates.values.clone();
    match (query.top, query.skip) {
        (Some(top), Some(skip)) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::Integer(top.into()));
            values.push(Value::Integer(skip.into()));
        }
        (Some(top), None) => {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(top.into()));
        }
        (None, Some(skip)) => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            values.push(Value::Integer(skip.into()));
        }
        (None, None) => {}
    }

    let mut stmt = conn.prepare(&sql)?;
    let articles = stmt
        .query_map(params_from_iter(values), article_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let total_count = if with_count {
        let count_sql = format!("SELECT COUNT(*) FROM articles a{where_sql}");
        conn.query_row(&count_sql, params_from_iter(predicates.values), |row| row.get(0))?
    } else {
        articles.len() as i64
    };

    Ok(QueryResult {
        articles,
        total_count,
    })
}

/// Returns `None` when the search index answered with no matches, which
/// means the query result is empty.
fn build_predicates(
    conn: &Connection,
    search: &SearchIndex,
    query: &ArticleQuery,
    topic_id: Option<i64>,
) -> rusqlite::Result<Option<Predicates>> {
    let mut predicates = Predicates::default();

    if let Some(id) = topic_id {
        predicates.push(TOPIC_SCOPE, [Value::Integer(id), Value::Integer(id)]);
    }

    let terms = query.search_terms();
    if !terms.is_empty() {
        match search.lookup(conn, &terms, topic_id) {
            Ok(ids) if ids.is_empty() => return Ok(None),
            Ok(ids) => {
                let ids = serde_json::to_string(&ids)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                predicates.push(
                    "a.article_id IN (SELECT value FROM json_each(?))",
                    [Value::Text(ids)],
                );
            }
            Err(e) => {
                tracing::debug!("Index lookup unavailable ({}), using substring search", e);
                let (clause, values) = any_column_contains(&SEARCH_COLUMNS, &terms);
                predicates.push(clause, values);
            }
        }
    }

    if let Some(filter) = non_blank(&query.filter) {
        let (clause, values) = any_column_contains(&FILTER_COLUMNS, &[filter.to_string()]);
        predicates.push(clause, values);
    }
    if let Some(from) = query.date_from {
        predicates.push("a.published_at >= ?", [Value::Text(format_datetime(&from))]);
    }
    if let Some(to) = query.date_to {
        predicates.push("a.published_at <= ?", [Value::Text(format_datetime(&to))]);
    }
    if let Some(source) = non_blank(&query.source) {
        predicates.push("a.source LIKE ? ESCAPE '\\'", [like_pattern(source)]);
    }
    if let Some(author) = non_blank(&query.author) {
        predicates.push("a.author LIKE ? ESCAPE '\\'", [like_pattern(author)]);
    }
    if let Some(category) = non_blank(&query.category) {
        // Categories are a JSON array; match one quoted element.
        let quoted = serde_json::to_string(category)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        predicates.push("a.categories LIKE ? ESCAPE '\\'", [like_pattern(&quoted)]);
    }

    Ok(Some(predicates))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `(c1 LIKE t1 OR c2 LIKE t1 ... OR c1 LIKE t2 ...)`
fn any_column_contains(columns: &[&str], terms: &[String]) -> (String, Vec<Value>) {
    let mut parts = Vec::new();
    let mut values = Vec::new();
    for term in terms {
        for column in columns {
            parts.push(format!("{column} LIKE ? ESCAPE '\\'"));
            values.push(like_pattern(term));
        }
    }
    (format!("({})", parts.join(" OR ")), values)
}

fn like_pattern(term: &str) -> Value {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Value::Text(format!("%{escaped}%"))
}

/// Maps `{field} {asc|desc}` onto a column ordering. Unknown input sorts by
/// publish date, newest first. Row id breaks ties so paging is stable.
fn order_clause(order_by: Option<&str>) -> &'static str {
    let Some(order_by) = order_by else {
        return DEFAULT_ORDER;
    };
    let mut parts = order_by.split_whitespace().map(str::to_ascii_lowercase);
    let field = parts.next().unwrap_or_default();
    let direction = parts.next();
    if parts.next().is_some() {
        return DEFAULT_ORDER;
    }

    match (field.as_str(), direction.as_deref()) {
        ("publishedat", None | Some("desc")) => DEFAULT_ORDER,
        ("publishedat", Some("asc")) => "a.published_at ASC, a.id ASC",
        ("title", None | Some("asc")) => "a.title COLLATE NOCASE ASC, a.id ASC",
        ("title", Some("desc")) => "a.title COLLATE NOCASE DESC, a.id DESC",
        ("author", None | Some("asc")) => "a.author COLLATE NOCASE ASC, a.id ASC",
        ("author", Some("desc")) => "a.author COLLATE NOCASE DESC, a.id DESC",
        ("source", None | Some("asc")) => "a.source COLLATE NOCASE ASC, a.id ASC",
        ("source", Some("desc")) => "a.source COLLATE NOCASE DESC, a.id DESC",
        ("createdat", None | Some("desc")) => "a.created_at DESC, a.id DESC",
        ("createdat", Some("asc")) => "a.created_at ASC, a.id ASC",
        ("updatedat", None | Some("desc")) => "a.updated_at DESC, a.id DESC",
        ("updatedat", Some("asc")) => "a.updated_at ASC, a.id ASC",
        _ => DEFAULT_ORDER,
    }
}
