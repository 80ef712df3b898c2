//! Article body normalization and the hot/cold storage policy.
//!
//! Fresh bodies stay inline in `articles.content`. Once an article is older
//! than [`FRESHNESS_THRESHOLD_DAYS`] its body may move into
//! `compressed_content` as a gzip blob, leaving the inline column empty.

use std::io::{Read, Write};
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;

use crate::error::{AppError, Result};

pub const FRESHNESS_THRESHOLD_DAYS: i64 = 3;

/// Rows handled by a single compression sweep.
pub const SWEEP_BATCH_SIZE: usize = 1000;

/// Substituted for a body whose compressed blob cannot be read.
pub const DECOMPRESSION_FAILED: &str = "[content unavailable: decompression failed]";

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));
static EXCESS_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {3,}").expect("valid regex"));

/// Trims the body and collapses long runs of blank lines and spaces.
pub fn normalize_content(content: &str) -> String {
    let trimmed = content.trim();
    let collapsed = EXCESS_NEWLINES.replace_all(trimmed, "\n\n\n");
    EXCESS_SPACES.replace_all(&collapsed, "  ").into_owned()
}

pub fn freshness_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(FRESHNESS_THRESHOLD_DAYS)
}

/// Whether a cleaned body should be stored compressed at ingest time.
pub fn should_compress(
    enabled: bool,
    published_at: DateTime<Utc>,
    cleaned: &str,
    now: DateTime<Utc>,
) -> bool {
    enabled && !cleaned.is_empty() && published_at < freshness_cutoff(now)
}

pub fn compress(content: &str) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes())?;
    Ok(encoder.finish()?)
}

pub fn decompress(blob: &[u8]) -> Result<String> {
    let mut decoder = GzDecoder::new(blob);
    let mut out = String::new();
    decoder
        .read_to_string(&mut out)
        .map_err(|e| AppError::Compression(e.to_string()))?;
    Ok(out)
}

/// Picks the readable body for a stored row. Never fails: an unreadable
/// blob yields [`DECOMPRESSION_FAILED`].
pub fn resolve_body(article_id: &str, inline: String, blob: Option<Vec<u8>>) -> String {
    if !inline.is_empty() {
        return inline;
    }
    match blob {
        Some(blob) => decompress(&blob).unwrap_or_else(|e| {
            tracing::warn!("Failed to decompress content for {}: {}", article_id, e);
            DECOMPRESSION_FAILED.to_string()
        }),
        None => inline,
    }
}
