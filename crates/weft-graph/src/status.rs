use indexmap::IndexSet;
use weft_types::{SpanId, StatusCode};

use crate::SpanGraph;

impl SpanGraph {
    // ── Propagation ─────────────────────────────────────────────

    /// Pushes this span's running/failed state to every span that needs to
    /// know: its ancestors, its link targets, and the link targets'
    /// ancestors. Spans whose membership actually changed are marked dirty.
    ///
    /// Failure marks propagate only to direct link targets, never up a
    /// target's parent chain: a causal link communicates liveness through
    /// both chains, but a failed effect is scoped to its installer.
    ///
    /// Idempotent and commutative across sibling updates; ingestion may
    /// deliver out of causal order and re-run this freely.
    pub fn propagate_status(&mut self, id: SpanId) {
        if !self.spans.contains_key(&id) {
            return;
        }
        let running = self.is_running(id);
        let running_or_links = self.is_running_or_links_running(id);
        let failed = self.is_failed(id);

        for parent_id in self.ancestor_chain(id) {
            let parent = self.span_mut(parent_id);
            let changed = if running_or_links {
                parent.running_spans.insert(id)
            } else {
                parent.running_spans.shift_remove(&id)
            };
            if changed {
                self.updated.insert(parent_id);
            }
        }

        let links: Vec<SpanId> = self.spans[&id].links_to.iter().copied().collect();
        for linked_id in links {
            let linked = self.span_mut(linked_id);
            let mut changed = if running {
                linked.running_spans.insert(id)
            } else {
                linked.running_spans.shift_remove(&id)
            };
            if failed {
                linked.failed_links.insert(id);
            }
            if linked.activity.add(id) {
                changed = true;
            }
            if changed {
                self.updated.insert(linked_id);
            }

            for parent_id in self.ancestor_chain(linked_id) {
                let parent = self.span_mut(parent_id);
                let mut changed = if running {
                    parent.running_spans.insert(id)
                } else {
                    parent.running_spans.shift_remove(&id)
                };
                if parent.activity.add(id) {
                    changed = true;
                }
                if changed {
                    self.updated.insert(parent_id);
                }
            }
        }
    }

    // ── Running ─────────────────────────────────────────────────

    /// A span runs while its end time still sorts before its start time.
    pub fn is_running(&self, id: SpanId) -> bool {
        self.spans
            .get(&id)
            .is_some_and(|span| span.state.end_time.before(span.state.start_time))
    }

    /// Running itself, or kept alive by a span that linked to it. Liveness
    /// flows backward through causal links even after the span's own timer
    /// has stopped.
    pub fn is_running_or_links_running(&self, id: SpanId) -> bool {
        if self.is_running(id) {
            return true;
        }
        let Some(span) = self.spans.get(&id) else {
            return false;
        };
        span.linked_from.iter().any(|&link| self.is_running(link))
    }

    // ── Failed ──────────────────────────────────────────────────

    /// The span's own status is an error.
    pub fn is_failed(&self, id: SpanId) -> bool {
        self.spans
            .get(&id)
            .is_some_and(|span| span.state.status == StatusCode::Error)
    }

    /// Failed directly, through a failed link, or through a failed effect it
    /// installed. The snapshotted `failed` flag short-circuits.
    pub fn is_failed_or_caused_failure(&self, id: SpanId) -> bool {
        let Some(span) = self.spans.get(&id) else {
            return false;
        };
        if span.state.failed {
            return true;
        }
        if span.state.status == StatusCode::Error || !span.failed_links.is_empty() {
            return true;
        }
        span.state
            .effect_ids
            .iter()
            .any(|effect| self.failed_effects.contains(effect))
    }

    /// The concrete spans responsible for this span's failure, in priority
    /// order: itself, then failed links, then failed effect attempts. Stops
    /// at the first non-empty tier.
    pub fn errors(&self, id: SpanId) -> Vec<SpanId> {
        let Some(span) = self.spans.get(&id) else {
            return Vec::new();
        };
        if self.is_failed(id) {
            return vec![id];
        }
        if !span.failed_links.is_empty() {
            return span.failed_links.iter().copied().collect();
        }
        let mut errors = Vec::new();
        for effect in &span.state.effect_ids {
            if !self.failed_effects.contains(effect) {
                continue;
            }
            for attempt in self.effect_spans(effect) {
                if self.is_failed(attempt) && !errors.contains(&attempt) {
                    errors.push(attempt);
                }
            }
        }
        errors
    }

    /// Human-readable failure explanation, concatenating every applicable
    /// reason rather than stopping at the first tier.
    pub fn failed_reason(&self, id: SpanId) -> (bool, Vec<String>) {
        let Some(span) = self.spans.get(&id) else {
            return (false, Vec::new());
        };
        let mut reasons = Vec::new();
        if span.state.status == StatusCode::Error {
            reasons.push("span itself errored".to_string());
        }
        for &failed in &span.failed_links {
            reasons.push(format!("span has failed link: {}", self.span_name(failed)));
        }
        for effect in &span.state.effect_ids {
            if self.failed_effects.contains(effect) {
                reasons.push(format!("span installed failed effect: {effect}"));
            }
        }
        (!reasons.is_empty(), reasons)
    }

    // ── Pending ─────────────────────────────────────────────────

    pub fn is_pending(&self, id: SpanId) -> bool {
        self.pending_reason(id).0
    }

    /// A stopped span with declared effects is pending while every one of
    /// them has neither an observed attempt nor a completion mark. A running
    /// span is not pending; the reasons then explain what is still live.
    pub fn pending_reason(&self, id: SpanId) -> (bool, Vec<String>) {
        let Some(span) = self.spans.get(&id) else {
            return (false, Vec::new());
        };
        if self.is_running_or_links_running(id) {
            let mut reasons = Vec::new();
            if self.is_running(id) {
                reasons.push("span is running".to_string());
            }
            for &running in &span.running_spans {
                reasons.push(format!("span has running link: {}", self.span_name(running)));
            }
            return (false, reasons);
        }
        if !span.state.effect_ids.is_empty() {
            let mut reasons = Vec::new();
            for effect in &span.state.effect_ids {
                if self.effect_has_spans(effect) {
                    return (false, vec![format!("{effect} has started")]);
                }
                if self.completed_effects.contains(effect) {
                    return (false, vec![format!("{effect} has completed")]);
                }
                reasons.push(format!("{effect} has not started"));
            }
            // effects are declared but nothing has picked them up yet
            return (true, reasons);
        }
        (false, vec!["span has completed".to_string()])
    }

    // ── Cached ──────────────────────────────────────────────────

    pub fn is_cached(&self, id: SpanId) -> bool {
        self.cached_reason(id).0
    }

    /// Cached when the span's own flag says so, or when every declared
    /// effect resolved to cached. An effect with observed attempts asks each
    /// attempt recursively; an effect no span was ever seen for falls back
    /// to the completion mark, which covers deep cache hits and out-of-band
    /// completions that would otherwise look pending forever.
    ///
    /// Attempts can alias each other through shared effect ids, and
    /// ingestion is untrusted, so the recursion tracks the spans on the
    /// current evaluation path; re-entering one resolves as not cached
    /// instead of recursing forever.
    pub fn cached_reason(&self, id: SpanId) -> (bool, Vec<String>) {
        let mut on_path = IndexSet::new();
        self.cached_reason_inner(id, &mut on_path)
    }

    fn cached_reason_inner(
        &self,
        id: SpanId,
        on_path: &mut IndexSet<SpanId>,
    ) -> (bool, Vec<String>) {
        let Some(span) = self.spans.get(&id) else {
            return (false, Vec::new());
        };
        if span.state.cached {
            return (true, vec!["span is cached".to_string()]);
        }
        if !on_path.insert(id) {
            return (false, Vec::new());
        }
        let mut cached = 0usize;
        let mut uncached = 0usize;
        let mut reasons = Vec::new();
        for effect in &span.state.effect_ids {
            let mut track = |is_cached: bool| {
                if is_cached {
                    cached += 1;
                    reasons.push(format!("{effect} is cached"));
                } else {
                    uncached += 1;
                    reasons.push(format!("{effect} is not cached"));
                }
            };
            if self.effect_has_spans(effect) {
                let attempts: Vec<SpanId> = self.effect_spans(effect).collect();
                for attempt in attempts {
                    let (attempt_cached, _) = self.cached_reason_inner(attempt, on_path);
                    track(attempt_cached);
                }
            } else {
                track(self.completed_effects.contains(effect));
            }
        }
        on_path.shift_remove(&id);
        (cached > 0 && uncached == 0, reasons)
    }
}
