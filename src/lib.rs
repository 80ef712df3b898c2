pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod models;
pub mod search;

pub use config::Config;
pub use db::Repository;
pub use error::{AppError, Result};
