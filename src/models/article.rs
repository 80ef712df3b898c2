use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article as handed over by the feed collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleInput {
    pub id: String,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// A stored article. `content` is always the readable body; compressed
/// bodies are inflated on the way out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(skip)]
    pub row_id: i64,
    #[serde(rename = "id")]
    pub article_id: String,
    pub topic: Option<String>,
    pub title: String,
    pub link: String,
    pub description: String,
    pub content: String,
    pub author: String,
    pub source: String,
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedInfo {
    pub topic: String,
    /// Not tracked by the store; always zero.
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub article_count: i64,
}

/// Result of a lossy batch operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}
