//! Live causal execution graph over distributed-tracing spans.
//!
//! Ingestion feeds span observations into a [`SpanGraph`]; the graph keeps
//! parent/link/effect relationships symmetric, propagates running and failed
//! state across them, and hands the renderer versioned [`SpanSnapshot`]s of
//! whatever changed since it last looked.
//!
//! Module split:
//! - `graph`: the span arena, relationship wiring, and the effect index
//! - `status`: status propagation and the derived-state resolvers
//! - `render`: visibility rules, child counting, and the snapshot versioner
//!
//! Nothing here blocks or locks. The caller serializes mutation; readers get
//! consistency by taking snapshots.

mod graph;
mod render;
mod status;

pub use graph::{Activity, Span, SpanGraph, SpanObservation};

pub use weft_types::SpanSnapshot;
