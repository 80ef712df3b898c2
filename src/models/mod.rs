mod article;
mod query;
mod stats;

pub use article::{Article, ArticleInput, BatchOutcome, FeedInfo, Topic};
pub use query::{ArticleQuery, QueryResult};
pub use stats::{SourceStats, StoreStats, TopicCount};
