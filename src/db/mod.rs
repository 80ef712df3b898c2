mod ingest;
mod maintenance;
mod query;
mod repository;
pub(crate) mod schema;

pub use repository::{format_datetime, parse_datetime, Repository};
pub use schema::{SENTINEL_TOPIC_ID, SENTINEL_TOPIC_NAME};

pub(crate) use repository::TOPIC_SCOPE;
