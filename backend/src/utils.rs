use chrono::{NaiveDateTime, Utc};

pub fn secs_since_epoch() -> i64 {
    Utc::now().timestamp()
}

/// Same text form SQLite uses for `CURRENT_TIMESTAMP`.
pub fn sqlite_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
