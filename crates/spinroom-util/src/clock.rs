use chrono::Utc;

/// Server wall-clock time in milliseconds since the Unix epoch.
/// Every timestamp that crosses the wire goes through this.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
