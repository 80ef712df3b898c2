use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_articles: i64,
    pub total_topics: i64,
    pub compressed_articles: i64,
    pub uncompressed_articles: i64,
    pub avg_content_size: f64,
    pub db_size_bytes: i64,
    pub sources: Vec<SourceStats>,
    pub topics: Vec<TopicCount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStats {
    pub source: String,
    pub article_count: i64,
    pub non_english_count: i64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicCount {
    pub topic: String,
    pub article_count: i64,
}
