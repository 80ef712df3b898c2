use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Article;

/// Structured query accepted by the article query translator.
///
/// `filter` is a plain substring, not an expression. Anything richer has to
/// be reduced to a substring before it gets here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleQuery {
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub search: Vec<String>,
    pub top: Option<u32>,
    pub skip: Option<u32>,
    pub select: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
}

impl ArticleQuery {
    pub fn search_terms(&self) -> Vec<String> {
        self.search
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub articles: Vec<Article>,
    /// Matching rows ignoring `top`/`skip`.
    pub total_count: i64,
}

impl QueryResult {
    /// Render the articles as JSON objects restricted to `select`. An empty
    /// selection keeps every field. Field names match case-insensitively.
    pub fn project(&self, select: &[String]) -> Result<Vec<Value>, serde_json::Error> {
        let wanted: Vec<String> = select
            .iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        self.articles
            .iter()
            .map(|article| {
                let value = serde_json::to_value(article)?;
                if wanted.is_empty() {
                    return Ok(value);
                }
                let projected: Map<String, Value> = match value {
                    Value::Object(fields) => fields
                        .into_iter()
                        .filter(|(k, _)| wanted.contains(&k.to_ascii_lowercase()))
                        .collect(),
                    _ => Map::new(),
                };
                Ok(Value::Object(projected))
            })
            .collect()
    }
}
