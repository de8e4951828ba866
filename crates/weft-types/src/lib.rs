//! Core value types for weft's causal span graph.
//!
//! - `SpanId` / `EffectId`: identity for spans and for content-addressed
//!   effects shared across spans.
//! - `Timestamp`: millisecond timestamps with the sentinel running
//!   convention (`end < start` means "still running").
//! - `SpanSnapshot`: the immutable, render-facing copy of one span's state.
//! - `AttrValue`: typed telemetry attribute values and the name-keyed decode
//!   table that maps them onto snapshot fields.

use facet::Facet;
use std::error::Error;
use std::fmt;

mod attrs;
mod snapshot;
mod time;

pub use attrs::{
    ATTR_CACHED, ATTR_CANCELED, ATTR_EFFECT_ID, ATTR_EFFECT_IDS, ATTR_EFFECTS_COMPLETED,
    ATTR_INPUTS, ATTR_OUTPUT, ATTR_RPC_SERVICE, ATTR_TASK_CALL, ATTR_TASK_DIGEST,
    ATTR_UI_ENCAPSULATE, ATTR_UI_ENCAPSULATED, ATTR_UI_IGNORE, ATTR_UI_INTERNAL, ATTR_UI_MASK,
    ATTR_UI_PASSTHROUGH, AttrError, AttrValue,
};
pub use snapshot::{
    MetricPoint, SHOW_ENCAPSULATED_VERBOSITY, SHOW_INTERNAL_VERBOSITY, SpanSnapshot, StatusCode,
    ViewOpts,
};
pub use time::{Timestamp, format_duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    ZeroId(&'static str),
    EmptyField(&'static str),
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroId(field) => write!(f, "{field} must be non-zero"),
            Self::EmptyField(field) => write!(f, "{field} must be non-empty"),
        }
    }
}

impl Error for InvariantError {}

/// Identity of one span, stable for the span's lifetime.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct SpanId(u64);

impl SpanId {
    pub fn new(value: u64) -> Result<Self, InvariantError> {
        if value == 0 {
            return Err(InvariantError::ZeroId("span_id"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Content-addressed descriptor of a unit of work that many spans may
/// independently attempt, complete, or reuse from cache.
#[derive(Facet, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(String);

impl EffectId {
    pub fn new(value: impl Into<String>) -> Result<Self, InvariantError> {
        let value = value.into();
        if value.is_empty() {
            return Err(InvariantError::EmptyField("effect_id"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
