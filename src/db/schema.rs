use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

/// Legacy owner of articles stored without a topic.
pub const SENTINEL_TOPIC_ID: i64 = 0;
pub const SENTINEL_TOPIC_NAME: &str = "__unassigned__";

pub const SCHEMA: &str = r#"
-- topics table
CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- id 0 owns articles that were saved without a topic
INSERT OR IGNORE INTO topics (id, name) VALUES (0, '__unassigned__');

-- articles table
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id TEXT NOT NULL UNIQUE,
    topic_id INTEGER NOT NULL DEFAULT 0 REFERENCES topics(id) ON DELETE CASCADE,
    title TEXT NOT NULL DEFAULT '',
    link TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    categories TEXT NOT NULL DEFAULT '[]',
    published_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    language TEXT NOT NULL DEFAULT 'en'
);

CREATE INDEX IF NOT EXISTS idx_articles_topic_id ON articles(topic_id);
CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles(published_at DESC);
CREATE INDEX IF NOT EXISTS idx_articles_author ON articles(author);
CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source);
CREATE INDEX IF NOT EXISTS idx_articles_topic_published ON articles(topic_id, published_at DESC);
CREATE INDEX IF NOT EXISTS idx_articles_author_source ON articles(author, source);
CREATE INDEX IF NOT EXISTS idx_articles_link ON articles(link);

-- compressed_content table (cold bodies, 1:1 with articles)
CREATE TABLE IF NOT EXISTS compressed_content (
    article_id TEXT PRIMARY KEY REFERENCES articles(article_id) ON DELETE CASCADE,
    compressed_content BLOB NOT NULL,
    compressed_at TEXT NOT NULL
);

-- search_index table (inverted index, rebuilt per article on every write)
CREATE TABLE IF NOT EXISTS search_index (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id TEXT NOT NULL REFERENCES articles(article_id) ON DELETE CASCADE,
    search_term TEXT NOT NULL,
    field_type TEXT NOT NULL,
    language TEXT NOT NULL DEFAULT 'en',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_search_index_term ON search_index(search_term, language);
CREATE INDEX IF NOT EXISTS idx_search_index_article_id ON search_index(article_id);

-- article_topics table (authoritative many-to-many membership)
CREATE TABLE IF NOT EXISTS article_topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id TEXT NOT NULL REFERENCES articles(article_id) ON DELETE CASCADE,
    topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    UNIQUE(article_id, topic_id)
);

CREATE INDEX IF NOT EXISTS idx_article_topics_topic_id ON article_topics(topic_id);
"#;

/// Tables that must exist with at least these columns, or the store is
/// rebuilt. `article_topics` is not listed; it is created on demand.
const REQUIRED_TABLES: &[(&str, &[&str])] = &[
    ("topics", &["id", "name", "created_at", "updated_at"]),
    (
        "articles",
        &[
            "id",
            "article_id",
            "topic_id",
            "title",
            "link",
            "description",
            "content",
            "author",
            "source",
            "categories",
            "published_at",
            "created_at",
            "updated_at",
            "language",
        ],
    ),
    (
        "compressed_content",
        &["article_id", "compressed_content", "compressed_at"],
    ),
    (
        "search_index",
        &["id", "article_id", "search_term", "field_type", "language"],
    ),
];

/// Names the first structural problem found, or `None` if the layout is
/// usable. Only table and column names are compared.
pub fn structural_problem(conn: &Connection) -> rusqlite::Result<Option<String>> {
    for (table, columns) in REQUIRED_TABLES {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let present: Vec<String> = stmt
            .query_map([table], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        if present.is_empty() {
            return Ok(Some(format!("missing table '{table}'")));
        }
        if let Some(column) = columns.iter().find(|c| !present.iter().any(|p| p == *c)) {
            return Ok(Some(format!("table '{table}' is missing column '{column}'")));
        }
    }
    Ok(None)
}

/// Decides whether the database file at `path` must be recreated, and
/// deletes it (with its WAL side files) if so. Returns `true` when the
/// store starts out empty.
pub fn prepare_store(path: &Path, force_rebuild: bool) -> Result<bool> {
    if !path.exists() {
        tracing::info!("No database at {}, creating a new one", path.display());
        return Ok(true);
    }

    let reason = if force_rebuild {
        Some("rebuild forced by configuration".to_string())
    } else {
        let conn = Connection::open(path)?;
        let problem = match structural_problem(&conn) {
            Ok(problem) => problem,
            Err(e) => Some(format!("schema check failed: {e}")),
        };
        drop(conn);
        problem
    };

    let Some(reason) = reason else {
        return Ok(false);
    };

    tracing::warn!(
        "Rebuilding database at {} ({}); all stored topics and articles are discarded",
        path.display(),
        reason
    );
    remove_database_files(path)?;
    Ok(true)
}

fn remove_database_files(path: &Path) -> Result<()> {
    std::fs::remove_file(path)?;
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        match std::fs::remove_file(&side) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
