use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn parse_ranking_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
}

/// Joins the non-empty segments of a store path. `None` when a segment holds
/// a character the store forbids.
pub fn normalize_db_path(raw: &str) -> Option<String> {
    let segments: Vec<&str> = raw
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.iter().any(|segment| {
        segment
            .chars()
            .any(|ch| matches!(ch, '.' | '#' | '$' | '[' | ']'))
    }) {
        return None;
    }
    Some(segments.join("/"))
}
