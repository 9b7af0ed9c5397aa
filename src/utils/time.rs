use chrono::{DateTime, Duration, TimeZone, Utc};

pub fn time_now() -> DateTime<Utc> {
    Utc::now()
}

pub fn time_now_plus_days(days: i64) -> DateTime<Utc> {
    time_now() + Duration::days(days)
}

/// Unix seconds as sent by the payment provider.
pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
