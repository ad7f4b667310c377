use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub const MS_PER_SEC: u64 = 1_000;
pub const MS_PER_MIN: u64 = 60 * MS_PER_SEC;
pub const MS_PER_HOUR: u64 = 60 * MS_PER_MIN;
