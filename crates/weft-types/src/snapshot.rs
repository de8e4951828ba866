use facet::Facet;

use crate::{EffectId, SpanId, Timestamp};

/// Verbosity at which `internal` spans become visible.
pub const SHOW_INTERNAL_VERBOSITY: u8 = 2;
/// Verbosity at which `encapsulated` spans become visible even without a
/// parent failure.
pub const SHOW_ENCAPSULATED_VERBOSITY: u8 = 3;

/// Options the renderer supplies when asking visibility questions.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewOpts {
    pub verbosity: u8,
}

/// Tracing status code reported for a span.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum StatusCode {
    #[default]
    Unset,
    Ok,
    Error,
}

/// One telemetry datapoint, stored verbatim per span for display.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricPoint {
    pub at: Timestamp,
    pub value: i64,
}

/// Point-in-time copy of one span's externally visible state, including the
/// derived booleans, suitable for serialization without a reference into the
/// live mutable graph.
#[derive(Facet, Debug, Clone, PartialEq)]
pub struct SpanSnapshot {
    /// Monotonically increasing number for each snapshot taken of this span.
    pub version: u64,

    pub id: SpanId,
    pub name: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,

    pub parent_id: Option<SpanId>,
    /// Explicit causal references to other spans, in declaration order.
    pub links: Vec<SpanId>,

    pub status: StatusCode,

    /// Includes failures caused through links and shared effects.
    pub failed: bool,
    pub cached: bool,
    pub pending: bool,
    pub canceled: bool,

    pub internal: bool,
    pub encapsulate: bool,
    pub encapsulated: bool,
    pub mask: bool,
    pub passthrough: bool,
    pub ignore: bool,

    pub inputs: Vec<String>,
    pub output: Option<String>,

    pub task_digest: Option<String>,
    pub task_payload: Option<String>,

    /// The single effect this span itself is an attempt at, if any.
    pub effect_id: Option<EffectId>,
    /// Effects this span claims to install.
    pub effect_ids: Vec<EffectId>,
    /// Effects reported complete out-of-band by this span.
    pub effects_completed: Vec<EffectId>,

    pub child_count: usize,
}

impl SpanSnapshot {
    pub fn new(id: SpanId, name: impl Into<String>) -> Self {
        Self {
            version: 0,
            id,
            name: name.into(),
            start_time: Timestamp::UNSET,
            end_time: Timestamp::UNSET,
            parent_id: None,
            links: Vec::new(),
            status: StatusCode::Unset,
            failed: false,
            cached: false,
            pending: false,
            canceled: false,
            internal: false,
            encapsulate: false,
            encapsulated: false,
            mask: false,
            passthrough: false,
            ignore: false,
            inputs: Vec::new(),
            output: None,
            task_digest: None,
            task_payload: None,
            effect_id: None,
            effect_ids: Vec::new(),
            effects_completed: Vec::new(),
            child_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(value: u64) -> SpanId {
        SpanId::new(value).expect("non-zero test id")
    }

    #[test]
    fn new_snapshot_has_no_derived_state() {
        let snapshot = SpanSnapshot::new(sid(7), "build");
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.status, StatusCode::Unset);
        assert!(!snapshot.failed && !snapshot.cached && !snapshot.pending);
        assert!(snapshot.end_time == Timestamp::UNSET);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let mut snapshot = SpanSnapshot::new(sid(7), "build");
        snapshot.effect_ids = vec![EffectId::new("sha256:feed").expect("non-empty")];
        let json = facet_json::to_string(&snapshot).expect("snapshot must serialize");
        assert!(json.contains("\"build\""), "name must serialize: {json}");
        assert!(json.contains("sha256:feed"), "effects must serialize: {json}");
    }
}
