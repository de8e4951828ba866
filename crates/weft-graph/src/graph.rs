use std::collections::{BTreeMap, BTreeSet};

use indexmap::{IndexMap, IndexSet};
use tracing::warn;
use weft_types::{AttrValue, EffectId, MetricPoint, SpanId, SpanSnapshot, StatusCode, Timestamp};

// ── Activity ────────────────────────────────────────────────────

/// Accumulating record of spans observed to affect a span, used for
/// passthrough/encapsulation reporting.
#[derive(Debug, Clone, Default)]
pub struct Activity {
    spans: IndexSet<SpanId>,
}

impl Activity {
    /// Records `id`; returns true when it was not already recorded.
    pub fn add(&mut self, id: SpanId) -> bool {
        self.spans.insert(id)
    }

    pub fn spans(&self) -> impl Iterator<Item = SpanId> + '_ {
        self.spans.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

// ── Span node ───────────────────────────────────────────────────

/// One node in the causal graph: the snapshot state plus the relationship
/// sets maintained by wiring and propagation.
///
/// Relationship sets hold identifiers into the owning [`SpanGraph`] arena,
/// never references, so the graph has no ownership cycles. All sets preserve
/// insertion order and unique membership.
#[derive(Debug, Clone)]
pub struct Span {
    pub state: SpanSnapshot,

    /// Exclusive parent, set once at wiring time.
    pub parent: Option<SpanId>,
    pub children: IndexSet<SpanId>,
    /// Inverse of `links_to`: spans that declared a causal link to this one.
    pub linked_from: IndexSet<SpanId>,
    pub links_to: IndexSet<SpanId>,
    /// Spans (descendants or links) currently keeping this span alive.
    pub running_spans: IndexSet<SpanId>,
    /// Links that have failed. Marks accumulate and are never cleared.
    pub failed_links: IndexSet<SpanId>,

    pub activity: Activity,

    /// Telemetry datapoints keyed by metric name, pass-through for display.
    pub metrics_by_name: BTreeMap<String, Vec<MetricPoint>>,

    /// True only once ingestion actually delivered this span, as opposed to
    /// it being synthesized for a referenced-but-unseen parent or link.
    pub received: bool,
}

impl Span {
    fn placeholder(id: SpanId) -> Self {
        Self {
            state: SpanSnapshot::new(id, ""),
            parent: None,
            children: IndexSet::new(),
            linked_from: IndexSet::new(),
            links_to: IndexSet::new(),
            running_spans: IndexSet::new(),
            failed_links: IndexSet::new(),
            activity: Activity::default(),
            metrics_by_name: BTreeMap::new(),
            received: false,
        }
    }

    pub fn id(&self) -> SpanId {
        self.state.id
    }
}

// ── Observations ────────────────────────────────────────────────

/// One delivery from the ingestion pipeline for a single span identity.
///
/// Deliveries may arrive multiple times per identity and in any order
/// relative to the spans they reference; every field is optional except the
/// identity itself.
#[derive(Debug, Clone, Default)]
pub struct SpanObservation {
    pub name: Option<String>,
    pub parent: Option<SpanId>,
    pub links: Vec<SpanId>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub status: Option<StatusCode>,
    pub attributes: Vec<(String, AttrValue)>,
}

// ── The graph ───────────────────────────────────────────────────

/// Arena of spans addressed by identifier, together with the effect index
/// and the dirty set the renderer drains.
///
/// Spans are never deleted; they live for the duration of the pipeline run.
#[derive(Debug, Clone, Default)]
pub struct SpanGraph {
    pub(crate) spans: IndexMap<SpanId, Span>,
    pub(crate) effect_spans: IndexMap<EffectId, IndexSet<SpanId>>,
    pub(crate) failed_effects: BTreeSet<EffectId>,
    pub(crate) completed_effects: BTreeSet<EffectId>,
    pub(crate) updated: IndexSet<SpanId>,
}

impl SpanGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SpanId) -> Option<&Span> {
        self.spans.get(&id)
    }

    pub fn contains(&self, id: SpanId) -> bool {
        self.spans.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.spans.values()
    }

    pub(crate) fn span_mut(&mut self, id: SpanId) -> &mut Span {
        self.spans
            .get_mut(&id)
            .expect("invariant violated: span must exist in arena before mutation")
    }

    fn ensure_span(&mut self, id: SpanId) -> &mut Span {
        self.spans.entry(id).or_insert_with(|| Span::placeholder(id))
    }

    // ── Ingestion ───────────────────────────────────────────────

    /// Applies one observation: upserts the span, decodes attributes, wires
    /// relationships, indexes effect facts, and propagates status.
    ///
    /// Safe to call repeatedly and in any arrival order; wiring recomputes
    /// from current membership rather than assuming causal delivery.
    pub fn observe(&mut self, id: SpanId, observation: SpanObservation) {
        let span = self.ensure_span(id);
        span.received = true;
        if let Some(name) = observation.name {
            span.state.name = name;
        }
        if let Some(start) = observation.start_time {
            span.state.start_time = start;
        }
        if let Some(end) = observation.end_time {
            span.state.end_time = end;
        }
        if let Some(status) = observation.status {
            span.state.status = status;
        }
        for (name, value) in &observation.attributes {
            // per-attribute isolation: one bad value never aborts its siblings
            if let Err(err) = span.state.apply_attribute(name, value) {
                warn!(span = %id, attr = name.as_str(), %err, "failed to decode span attribute");
            }
        }

        self.wire_parent(id, observation.parent);
        self.wire_links(id, &observation.links);
        self.index_effects(id);
        self.propagate_status(id);
        self.updated.insert(id);
    }

    /// Stores one metric datapoint verbatim and marks the span dirty.
    pub fn observe_metric(&mut self, id: SpanId, metric: impl Into<String>, point: MetricPoint) {
        let span = self.ensure_span(id);
        span.metrics_by_name.entry(metric.into()).or_default().push(point);
        self.updated.insert(id);
    }

    fn wire_parent(&mut self, id: SpanId, declared: Option<SpanId>) {
        let Some(parent_id) = declared else { return };
        if parent_id == id {
            warn!(span = %id, "ignoring self-referential parent");
            return;
        }
        if self.spans[&id].parent.is_some() {
            // the parent relationship is exclusive and set once
            return;
        }
        self.ensure_span(parent_id);
        if self.has_parent(parent_id, id) {
            warn!(span = %id, parent = %parent_id, "refusing parent assignment that would create a cycle");
            return;
        }
        let span = self.span_mut(id);
        span.parent = Some(parent_id);
        span.state.parent_id = Some(parent_id);
        self.span_mut(parent_id).children.insert(id);
    }

    fn wire_links(&mut self, id: SpanId, links: &[SpanId]) {
        for &target in links {
            if target == id {
                continue;
            }
            self.ensure_span(target);
            let span = self.span_mut(id);
            if span.links_to.insert(target) {
                span.state.links.push(target);
            }
            self.span_mut(target).linked_from.insert(id);
        }
    }

    // ── Effect index ────────────────────────────────────────────

    fn index_effects(&mut self, id: SpanId) {
        let span = &self.spans[&id];
        let attempt = span.state.effect_id.clone();
        let reported_complete = span.state.effects_completed.clone();
        let failed = span.state.status == StatusCode::Error;
        let ended = span.state.end_time != Timestamp::UNSET
            && !span.state.end_time.before(span.state.start_time);

        if let Some(effect) = attempt {
            self.record_effect_span(effect.clone(), id);
            if failed {
                self.failed_effects.insert(effect.clone());
            }
            if ended {
                self.completed_effects.insert(effect);
            }
        }
        for effect in reported_complete {
            self.completed_effects.insert(effect);
        }
    }

    /// Records that `id` has been observed to implement `effect`.
    pub fn record_effect_span(&mut self, effect: EffectId, id: SpanId) {
        self.effect_spans.entry(effect).or_default().insert(id);
    }

    /// Marks an effect as having had a failed attempt.
    pub fn mark_effect_failed(&mut self, effect: EffectId) {
        self.failed_effects.insert(effect);
    }

    /// Marks an effect as finished, successfully or not.
    pub fn mark_effect_completed(&mut self, effect: EffectId) {
        self.completed_effects.insert(effect);
    }

    pub fn effect_spans(&self, effect: &EffectId) -> impl Iterator<Item = SpanId> + '_ {
        self.effect_spans
            .get(effect)
            .into_iter()
            .flat_map(|spans| spans.iter().copied())
    }

    pub(crate) fn effect_has_spans(&self, effect: &EffectId) -> bool {
        self.effect_spans
            .get(effect)
            .is_some_and(|spans| !spans.is_empty())
    }

    pub fn effect_failed(&self, effect: &EffectId) -> bool {
        self.failed_effects.contains(effect)
    }

    pub fn effect_completed(&self, effect: &EffectId) -> bool {
        self.completed_effects.contains(effect)
    }

    // ── Dirty set ───────────────────────────────────────────────

    /// Drains the set of spans whose snapshot changed since the last drain.
    pub fn take_updated(&mut self) -> Vec<SpanId> {
        self.updated.drain(..).collect()
    }

    // ── Traversal ───────────────────────────────────────────────

    /// Walks the ancestor chain, invoking `visit` per ancestor; a `false`
    /// return stops the walk early.
    pub fn parents(&self, id: SpanId, mut visit: impl FnMut(&Span) -> bool) {
        let mut current = self.spans.get(&id).and_then(|span| span.parent);
        while let Some(parent_id) = current {
            let Some(parent) = self.spans.get(&parent_id) else {
                return;
            };
            if !visit(parent) {
                return;
            }
            current = parent.parent;
        }
    }

    /// Transitive ancestor-membership test.
    pub fn has_parent(&self, id: SpanId, ancestor: SpanId) -> bool {
        let mut found = false;
        self.parents(id, |parent| {
            if parent.id() == ancestor {
                found = true;
                return false;
            }
            true
        });
        found
    }

    pub(crate) fn ancestor_chain(&self, id: SpanId) -> Vec<SpanId> {
        let mut chain = Vec::new();
        self.parents(id, |parent| {
            chain.push(parent.id());
            true
        });
        chain
    }

    pub(crate) fn span_name(&self, id: SpanId) -> &str {
        self.spans.get(&id).map_or("", |span| span.state.name.as_str())
    }
}
