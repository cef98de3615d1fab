use chrono::{DateTime, Utc};

use crate::CoreError;

pub type Timestamp = DateTime<Utc>;

/// Returns the current wall-clock time truncated to milliseconds, the precision
/// timestamps are persisted with.
pub fn now() -> Result<Timestamp, CoreError> {
    from_millis(Utc::now().timestamp_millis())
}

pub fn from_millis(ms: i64) -> Result<Timestamp, CoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CoreError::InvalidTimestamp(format!("{ms}ms out of range")))
}

/// RFC 3339 with millisecond precision and a `Z` suffix. Fixed width, so the
/// text sorts the same way the instants do.
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn parse_timestamp(s: &str) -> Result<Timestamp, CoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::InvalidTimestamp(format!("{s}: {e}")))
}

/// The smallest persisted timestamp strictly after `prev`, or now if that is later.
pub fn next_after(prev: &Timestamp) -> Result<Timestamp, CoreError> {
    let now_ms = Utc::now().timestamp_millis();
    from_millis(now_ms.max(prev.timestamp_millis() + 1))
}

/// Issues strictly increasing millisecond timestamps for minting flash ids,
/// so two notes created within the same millisecond never share one.
#[derive(Debug)]
pub struct FlashClock {
    last_ms: i64,
}

impl FlashClock {
    pub fn new() -> Self {
        Self { last_ms: 0 }
    }

    pub fn tick(&mut self) -> i64 {
        let now_ms = Utc::now().timestamp_millis();
        let next = if now_ms > self.last_ms {
            now_ms
        } else {
            self.last_ms + 1
        };
        self.last_ms = next;
        next
    }

    /// Never issue anything at or below `ms` again (e.g. after loading notes
    /// whose flash ids were minted by a clock running ahead of ours).
    pub fn observe(&mut self, ms: i64) {
        self.last_ms = self.last_ms.max(ms);
    }
}

impl Default for FlashClock {
    fn default() -> Self {
        Self::new()
    }
}
