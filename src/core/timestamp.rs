use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Milliseconds since the Unix epoch. Clocks before 1970 read as 0.
pub fn utc_ms_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(_) => 0,
    }
}

pub fn format_utc_ms(utc_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(utc_ms) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => format!("{}ms", utc_ms),
    }
}
