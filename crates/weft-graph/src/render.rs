use weft_types::{
    SHOW_ENCAPSULATED_VERBOSITY, SHOW_INTERNAL_VERBOSITY, SpanId, SpanSnapshot, Timestamp,
    ViewOpts, format_duration,
};

use crate::SpanGraph;

impl SpanGraph {
    // ── Visibility ──────────────────────────────────────────────

    /// Whether the default view hides this span under `opts`.
    ///
    /// Internal spans hide below the internal-visibility threshold.
    /// Encapsulated spans (or children of an encapsulating parent) hide
    /// below the encapsulated-visibility threshold, unless the parent has
    /// failed: failures inside hidden subgroups are never swallowed.
    pub fn hidden(&self, id: SpanId, opts: ViewOpts) -> bool {
        let Some(span) = self.spans.get(&id) else {
            return true;
        };
        if span.state.internal && opts.verbosity < SHOW_INTERNAL_VERBOSITY {
            return true;
        }
        if let Some(parent_id) = span.parent {
            let parent_encapsulates = self
                .spans
                .get(&parent_id)
                .is_some_and(|parent| parent.state.encapsulate);
            if (span.state.encapsulated || parent_encapsulates)
                && !self.is_failed(parent_id)
                && opts.verbosity < SHOW_ENCAPSULATED_VERBOSITY
            {
                return true;
            }
        }
        false
    }

    /// The span a human should see as this one's parent: passthrough
    /// ancestors are skipped, and an explicit causal link outranks plain
    /// nesting.
    pub fn visible_parent(&self, id: SpanId, opts: ViewOpts) -> Option<SpanId> {
        let span = self.spans.get(&id)?;
        let parent_id = span.parent?;
        if self
            .spans
            .get(&parent_id)
            .is_some_and(|parent| parent.state.passthrough)
        {
            return self.visible_parent(parent_id, opts);
        }
        if let Some(&first) = span.links_to.first() {
            return Some(first);
        }
        Some(parent_id)
    }

    /// Number of visible children, unfolding passthrough children into
    /// their grandchildren. Uses a fixed verbosity one step below
    /// show-internal, matching the renderer's default.
    pub fn child_count(&self, id: SpanId) -> usize {
        self.count_children(
            id,
            ViewOpts {
                verbosity: SHOW_INTERNAL_VERBOSITY - 1,
            },
        )
    }

    fn count_children(&self, id: SpanId, opts: ViewOpts) -> usize {
        let Some(span) = self.spans.get(&id) else {
            return 0;
        };
        let mut count = 0;
        for &child in &span.children {
            let passthrough = self
                .spans
                .get(&child)
                .is_some_and(|c| c.state.passthrough);
            if passthrough {
                count += self.count_children(child, opts);
            } else if !self.hidden(child, opts) {
                count += 1;
            }
        }
        count
    }

    // ── Snapshotting ────────────────────────────────────────────

    /// Produces the immutable render-ready copy of this span's state,
    /// bumping its monotonic version.
    ///
    /// This is the only place the derived booleans are persisted onto the
    /// live span; every other read goes through the resolvers so topology
    /// changes between snapshots cannot go stale.
    pub fn snapshot(&mut self, id: SpanId) -> Option<SpanSnapshot> {
        if !self.spans.contains_key(&id) {
            return None;
        }
        let child_count = self.child_count(id);
        let failed = self.is_failed_or_caused_failure(id);
        let cached = self.is_cached(id);
        let pending = self.is_pending(id);

        let span = self.span_mut(id);
        span.state.version += 1;
        span.state.child_count = child_count;
        span.state.failed = failed;
        span.state.cached = cached;
        span.state.pending = pending;
        Some(span.state.clone())
    }

    // ── Durations ───────────────────────────────────────────────

    /// The span's effective end: the fallback while anything still runs,
    /// otherwise the latest end time across itself and its incoming links.
    pub fn end_time_or_fallback(&self, id: SpanId, fallback: Timestamp) -> Timestamp {
        if self.is_running_or_links_running(id) {
            return fallback;
        }
        let Some(span) = self.spans.get(&id) else {
            return fallback;
        };
        let mut latest = span.state.end_time;
        for &link in &span.linked_from {
            if let Some(linked) = self.spans.get(&link) {
                if linked.state.end_time.after(latest) {
                    latest = linked.state.end_time;
                }
            }
        }
        latest
    }

    /// Elapsed milliseconds from the span's start to its effective end.
    pub fn self_duration_millis(&self, id: SpanId, fallback: Timestamp) -> i64 {
        let Some(span) = self.spans.get(&id) else {
            return 0;
        };
        if self.is_running_or_links_running(id) {
            return fallback.millis_since(span.state.start_time);
        }
        self.end_time_or_fallback(id, fallback)
            .millis_since(span.state.start_time)
    }

    /// `self_duration_millis` rendered for display.
    pub fn self_duration_display(&self, id: SpanId, fallback: Timestamp) -> String {
        format_duration(self.self_duration_millis(id, fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpanObservation;
    use weft_types::{
        ATTR_UI_ENCAPSULATED, ATTR_UI_INTERNAL, ATTR_UI_PASSTHROUGH, AttrValue, StatusCode,
    };

    fn sid(value: u64) -> SpanId {
        SpanId::new(value).expect("non-zero test id")
    }

    fn named(name: &str) -> SpanObservation {
        SpanObservation {
            name: Some(name.to_string()),
            ..SpanObservation::default()
        }
    }

    fn child_of(parent: SpanId, name: &str) -> SpanObservation {
        SpanObservation {
            parent: Some(parent),
            ..named(name)
        }
    }

    fn flagged(observation: SpanObservation, attr: &str) -> SpanObservation {
        let mut observation = observation;
        observation
            .attributes
            .push((attr.to_string(), AttrValue::Bool(true)));
        observation
    }

    fn verbosity(level: u8) -> ViewOpts {
        ViewOpts { verbosity: level }
    }

    #[test]
    fn internal_spans_hide_below_the_threshold() {
        let mut graph = SpanGraph::new();
        graph.observe(sid(1), flagged(named("internal"), ATTR_UI_INTERNAL));
        assert!(graph.hidden(sid(1), verbosity(SHOW_INTERNAL_VERBOSITY - 1)));
        assert!(!graph.hidden(sid(1), verbosity(SHOW_INTERNAL_VERBOSITY)));
    }

    #[test]
    fn parent_failure_overrides_encapsulation() {
        let mut graph = SpanGraph::new();
        graph.observe(sid(1), named("parent"));
        graph.observe(
            sid(2),
            flagged(child_of(sid(1), "secret"), ATTR_UI_ENCAPSULATED),
        );
        assert!(graph.hidden(sid(2), verbosity(0)));
        assert!(!graph.hidden(sid(2), verbosity(SHOW_ENCAPSULATED_VERBOSITY)));

        graph.observe(
            sid(1),
            SpanObservation {
                status: Some(StatusCode::Error),
                ..SpanObservation::default()
            },
        );
        assert!(
            !graph.hidden(sid(2), verbosity(0)),
            "a failed parent must reveal its encapsulated children"
        );
    }

    #[test]
    fn encapsulating_parent_hides_its_children() {
        let mut graph = SpanGraph::new();
        graph.observe(sid(1), flagged(named("group"), weft_types::ATTR_UI_ENCAPSULATE));
        graph.observe(sid(2), child_of(sid(1), "member"));
        assert!(graph.hidden(sid(2), verbosity(0)));
    }

    #[test]
    fn child_count_unfolds_passthrough_children() {
        let mut graph = SpanGraph::new();
        graph.observe(sid(1), named("parent"));
        graph.observe(sid(2), child_of(sid(1), "a"));
        graph.observe(sid(3), child_of(sid(1), "b"));
        graph.observe(
            sid(4),
            flagged(child_of(sid(1), "alias"), ATTR_UI_PASSTHROUGH),
        );
        graph.observe(sid(5), child_of(sid(4), "inner-a"));
        graph.observe(sid(6), child_of(sid(4), "inner-b"));

        assert_eq!(graph.child_count(sid(1)), 4);
    }

    #[test]
    fn hidden_children_are_not_counted() {
        let mut graph = SpanGraph::new();
        graph.observe(sid(1), named("parent"));
        graph.observe(sid(2), child_of(sid(1), "visible"));
        graph.observe(sid(3), flagged(child_of(sid(1), "internal"), ATTR_UI_INTERNAL));
        assert_eq!(graph.child_count(sid(1)), 1);
    }

    #[test]
    fn visible_parent_skips_passthrough_ancestors() {
        let mut graph = SpanGraph::new();
        graph.observe(sid(1), named("root"));
        graph.observe(sid(2), flagged(child_of(sid(1), "alias"), ATTR_UI_PASSTHROUGH));
        graph.observe(sid(3), child_of(sid(2), "leaf"));
        assert_eq!(graph.visible_parent(sid(3), ViewOpts::default()), Some(sid(1)));
    }

    #[test]
    fn causal_links_outrank_nesting() {
        let mut graph = SpanGraph::new();
        graph.observe(sid(1), named("parent"));
        graph.observe(sid(2), named("cause"));
        graph.observe(
            sid(3),
            SpanObservation {
                links: vec![sid(2)],
                ..child_of(sid(1), "effect")
            },
        );
        assert_eq!(graph.visible_parent(sid(3), ViewOpts::default()), Some(sid(2)));
    }

    #[test]
    fn snapshot_versions_strictly_increase_and_fill_derived_fields() {
        let mut graph = SpanGraph::new();
        graph.observe(sid(1), named("parent"));
        graph.observe(sid(2), child_of(sid(1), "child"));
        graph.observe(
            sid(3),
            SpanObservation {
                links: vec![sid(1)],
                status: Some(StatusCode::Error),
                start_time: Some(Timestamp::from_unix_millis(1_000)),
                end_time: Some(Timestamp::from_unix_millis(2_000)),
                ..named("failing")
            },
        );

        let first = graph.snapshot(sid(1)).expect("span exists");
        assert_eq!(first.version, 1);
        assert_eq!(first.child_count, 1);
        assert!(first.failed, "failed link must surface in the snapshot");

        let second = graph.snapshot(sid(1)).expect("span exists");
        assert_eq!(second.version, 2);
        assert!(graph.snapshot(sid(9)).is_none());
    }

    #[test]
    fn effective_end_covers_late_running_links() {
        let mut graph = SpanGraph::new();
        graph.observe(
            sid(1),
            SpanObservation {
                start_time: Some(Timestamp::from_unix_millis(1_000)),
                end_time: Some(Timestamp::from_unix_millis(2_000)),
                ..named("producer")
            },
        );
        graph.observe(
            sid(2),
            SpanObservation {
                links: vec![sid(1)],
                start_time: Some(Timestamp::from_unix_millis(1_500)),
                end_time: Some(Timestamp::from_unix_millis(5_000)),
                ..named("consumer")
            },
        );

        // the consumer ended later, so the producer's effective end extends
        let end = graph.end_time_or_fallback(sid(1), Timestamp::from_unix_millis(9_000));
        assert_eq!(end, Timestamp::from_unix_millis(5_000));
        assert_eq!(
            graph.self_duration_millis(sid(1), Timestamp::from_unix_millis(9_000)),
            4_000
        );
        assert_eq!(
            graph.self_duration_display(sid(1), Timestamp::from_unix_millis(9_000)),
            "4.0s"
        );
    }

    #[test]
    fn running_span_uses_the_fallback_end() {
        let mut graph = SpanGraph::new();
        graph.observe(
            sid(1),
            SpanObservation {
                start_time: Some(Timestamp::from_unix_millis(1_000)),
                ..named("live")
            },
        );
        assert_eq!(
            graph.self_duration_millis(sid(1), Timestamp::from_unix_millis(4_500)),
            3_500
        );
    }
}
