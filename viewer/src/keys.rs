use chrono::{DateTime, TimeZone, Utc};

fn fmt_ts(ms: i64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now);
    dt.format("%Y%m%dT%H%M%S%3fZ").to_string()
}

fn date_str(ms: i64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now);
    dt.format("%Y-%m-%d").to_string()
}

/// Relative path of a saved snapshot.
/// e.g. "2026-02-18/board_0003_20260218T093000000Z.png"
pub fn snapshot_key(prefix: &str, id: u64, captured_at_ms: i64) -> String {
    format!(
        "{date}/{prefix}_{id:04}_{ts}.png",
        date = date_str(captured_at_ms),
        ts = fmt_ts(captured_at_ms),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        // 2025-02-18T09:30:00.000Z
        let k = snapshot_key("board", 3, 1739871000000);
        assert_eq!(k, "2025-02-18/board_0003_20250218T093000000Z.png");
    }

    #[test]
    fn keys_sort_by_id_within_a_day() {
        let a = snapshot_key("board", 9, 1739871000000);
        let b = snapshot_key("board", 10, 1739871000000);
        assert!(a < b, "zero padding keeps ids ordered");
    }
}
