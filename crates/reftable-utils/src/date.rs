use bstr::BString;

/// A timestamp paired with the timezone offset it was recorded in. Each log
/// record stamps one of these via the committer identity at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitDate {
    /// Seconds since Unix epoch.
    pub timestamp: i64,
    /// Timezone offset in minutes from UTC (e.g., -300 for EST).
    pub tz_offset: i32,
}

impl GitDate {
    /// Build a date from an already-known timestamp and offset, e.g. when
    /// decoding one back out of a segment's text encoding.
    pub fn new(timestamp: i64, tz_offset_minutes: i32) -> Self {
        Self {
            timestamp,
            tz_offset: tz_offset_minutes,
        }
    }

    /// The current time, UTC (no local-timezone lookup: a committer
    /// identity that cares about a particular offset should build one with
    /// `new` instead).
    pub fn now() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            timestamp: secs as i64,
            tz_offset: 0,
        }
    }
}

/// Who a log record's write is attributed to, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub date: GitDate,
}
