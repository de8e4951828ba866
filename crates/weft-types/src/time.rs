use facet::Facet;
use std::fmt;

/// Unix-epoch timestamp in milliseconds.
///
/// The graph encodes "still running" as an ordering sentinel rather than an
/// `Option`: a span whose end time sorts before its start time has not ended
/// yet. A freshly started span carries `Timestamp::UNSET` as its end time.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const UNSET: Self = Self(0);

    pub fn from_unix_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn as_unix_millis(self) -> u64 {
        self.0
    }

    pub fn before(self, other: Self) -> bool {
        self.0 < other.0
    }

    pub fn after(self, other: Self) -> bool {
        self.0 > other.0
    }

    /// Signed elapsed milliseconds since `earlier`. Negative when `earlier`
    /// is actually later, which `format_duration` reports as invalid.
    pub fn millis_since(self, earlier: Self) -> i64 {
        self.0 as i64 - earlier.0 as i64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Renders a duration in milliseconds as a compact human string.
///
/// Sub-minute durations keep one decimal of seconds; longer durations round
/// seconds to the nearest integer and prepend minute/hour/day components.
pub fn format_duration(millis: i64) -> String {
    const MINUTE: i64 = 60_000;
    const HOUR: i64 = 3_600_000;
    const DAY: i64 = 86_400_000;

    if millis < 0 {
        return "INVALID_DURATION".to_string();
    }

    let days = millis / DAY;
    let hours = (millis / HOUR) % 24;
    let minutes = (millis / MINUTE) % 60;
    let seconds =
        millis as f64 / 1000.0 - (days * 86_400 + hours * 3_600 + minutes * 60) as f64;

    if millis < MINUTE {
        format!("{seconds:.1}s")
    } else if millis < HOUR {
        format!("{minutes}m{}s", seconds.round() as i64)
    } else if millis < DAY {
        format!("{hours}h{minutes}m{}s", seconds.round() as i64)
    } else {
        format!("{days}d{hours}h{minutes}m{}s", seconds.round() as i64)
    }
}
