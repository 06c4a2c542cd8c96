use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// Trimmed, sorted and de-duplicated identifiers; caller ordering never
/// reaches the cache key.
pub fn normalize_ids<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut normalized = ids
        .iter()
        .map(|id| id.as_ref().trim().to_string())
        .filter(|id| !id.is_empty())
        .collect::<Vec<_>>();
    normalized.sort();
    normalized.dedup();
    normalized
}

pub fn cache_key(normalized_ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_ids.join(",").as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn freshness(updated_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> Freshness {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    if now - updated_at < window {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}
