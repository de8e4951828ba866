use facet::Facet;
use std::error::Error;
use std::fmt;

use crate::{EffectId, InvariantError, SpanSnapshot};

pub const ATTR_TASK_DIGEST: &str = "task.digest";
pub const ATTR_TASK_CALL: &str = "task.call";
pub const ATTR_CACHED: &str = "task.cached";
pub const ATTR_CANCELED: &str = "task.canceled";
pub const ATTR_INPUTS: &str = "task.inputs";
pub const ATTR_OUTPUT: &str = "task.output";
pub const ATTR_EFFECT_ID: &str = "effect.id";
pub const ATTR_EFFECT_IDS: &str = "effect.ids";
pub const ATTR_EFFECTS_COMPLETED: &str = "effect.completed";
pub const ATTR_UI_INTERNAL: &str = "ui.internal";
pub const ATTR_UI_ENCAPSULATE: &str = "ui.encapsulate";
pub const ATTR_UI_ENCAPSULATED: &str = "ui.encapsulated";
pub const ATTR_UI_MASK: &str = "ui.mask";
pub const ATTR_UI_PASSTHROUGH: &str = "ui.passthrough";
pub const ATTR_UI_IGNORE: &str = "ui.ignore";
pub const ATTR_RPC_SERVICE: &str = "rpc.service";

/// A telemetry attribute value as delivered by ingestion. The wire does not
/// know field types statically, so decoding matches on the shape it got.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
    StrList(Vec<String>),
}

impl AttrValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::StrList(_) => "string list",
        }
    }

    fn expect_bool(&self, name: &str) -> Result<bool, AttrError> {
        match self {
            Self::Bool(value) => Ok(*value),
            other => Err(AttrError::type_mismatch(name, "bool", other)),
        }
    }

    fn expect_str(&self, name: &str) -> Result<&str, AttrError> {
        match self {
            Self::Str(value) => Ok(value),
            other => Err(AttrError::type_mismatch(name, "string", other)),
        }
    }

    fn expect_str_list(&self, name: &str) -> Result<&[String], AttrError> {
        match self {
            Self::StrList(values) => Ok(values),
            other => Err(AttrError::type_mismatch(name, "string list", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrError {
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },
    InvalidEffectId {
        name: String,
        source: InvariantError,
    },
}

impl AttrError {
    fn type_mismatch(name: &str, expected: &'static str, got: &AttrValue) -> Self {
        Self::TypeMismatch {
            name: name.to_string(),
            expected,
            got: got.kind(),
        }
    }
}

impl fmt::Display for AttrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch {
                name,
                expected,
                got,
            } => write!(f, "attribute {name} expects {expected}, got {got}"),
            Self::InvalidEffectId { name, source } => {
                write!(f, "attribute {name} carries an invalid effect id: {source}")
            }
        }
    }
}

impl Error for AttrError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidEffectId { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn effect_id(name: &str, value: &AttrValue) -> Result<EffectId, AttrError> {
    EffectId::new(value.expect_str(name)?).map_err(|source| AttrError::InvalidEffectId {
        name: name.to_string(),
        source,
    })
}

fn effect_id_list(name: &str, value: &AttrValue) -> Result<Vec<EffectId>, AttrError> {
    value
        .expect_str_list(name)?
        .iter()
        .map(|raw| {
            EffectId::new(raw.clone()).map_err(|source| AttrError::InvalidEffectId {
                name: name.to_string(),
                source,
            })
        })
        .collect()
}

impl SpanSnapshot {
    /// Applies one telemetry attribute to this snapshot by name.
    ///
    /// Unknown names are ignored. A failed decode leaves the snapshot
    /// untouched for that attribute and reports the error; callers apply the
    /// remaining attributes regardless.
    pub fn apply_attribute(&mut self, name: &str, value: &AttrValue) -> Result<(), AttrError> {
        match name {
            ATTR_TASK_DIGEST => self.task_digest = Some(value.expect_str(name)?.to_string()),
            ATTR_TASK_CALL => self.task_payload = Some(value.expect_str(name)?.to_string()),
            ATTR_CACHED => self.cached = value.expect_bool(name)?,
            ATTR_CANCELED => self.canceled = value.expect_bool(name)?,
            ATTR_INPUTS => self.inputs = value.expect_str_list(name)?.to_vec(),
            ATTR_OUTPUT => self.output = Some(value.expect_str(name)?.to_string()),
            ATTR_EFFECT_ID => self.effect_id = Some(effect_id(name, value)?),
            ATTR_EFFECT_IDS => self.effect_ids = effect_id_list(name, value)?,
            ATTR_EFFECTS_COMPLETED => self.effects_completed = effect_id_list(name, value)?,
            ATTR_UI_INTERNAL => self.internal = value.expect_bool(name)?,
            ATTR_UI_ENCAPSULATE => self.encapsulate = value.expect_bool(name)?,
            ATTR_UI_ENCAPSULATED => self.encapsulated = value.expect_bool(name)?,
            ATTR_UI_MASK => self.mask = value.expect_bool(name)?,
            ATTR_UI_PASSTHROUGH => self.passthrough = value.expect_bool(name)?,
            ATTR_UI_IGNORE => self.ignore = value.expect_bool(name)?,
            // any gRPC activity is encapsulated by default
            ATTR_RPC_SERVICE => self.encapsulated = true,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpanId;

    fn snapshot() -> SpanSnapshot {
        SpanSnapshot::new(SpanId::new(1).expect("non-zero test id"), "step")
    }

    #[test]
    fn cached_flag_decodes_from_bool() {
        let mut snap = snapshot();
        snap.apply_attribute(ATTR_CACHED, &AttrValue::Bool(true))
            .expect("bool attribute must decode");
        assert!(snap.cached);
    }

    #[test]
    fn type_mismatch_reports_and_leaves_field_untouched() {
        let mut snap = snapshot();
        let err = snap
            .apply_attribute(ATTR_CACHED, &AttrValue::Str("yes".into()))
            .expect_err("string is not a bool");
        assert_eq!(
            err,
            AttrError::TypeMismatch {
                name: ATTR_CACHED.to_string(),
                expected: "bool",
                got: "string",
            }
        );
        assert!(!snap.cached);
    }

    #[test]
    fn unknown_attribute_is_ignored() {
        let mut snap = snapshot();
        snap.apply_attribute("net.peer.port", &AttrValue::Int(443))
            .expect("unknown attributes are not errors");
        assert_eq!(snap, snapshot());
    }

    #[test]
    fn rpc_service_implies_encapsulated() {
        let mut snap = snapshot();
        snap.apply_attribute(ATTR_RPC_SERVICE, &AttrValue::Str("engine.Executor".into()))
            .expect("rpc.service accepts any shape");
        assert!(snap.encapsulated);
    }

    #[test]
    fn effect_id_list_decodes() {
        let mut snap = snapshot();
        snap.apply_attribute(
            ATTR_EFFECT_IDS,
            &AttrValue::StrList(vec!["sha256:aa".into(), "sha256:bb".into()]),
        )
        .expect("effect ids must decode");
        assert_eq!(snap.effect_ids.len(), 2);
        assert_eq!(snap.effect_ids[0].as_str(), "sha256:aa");
    }

    #[test]
    fn empty_effect_id_in_list_is_rejected() {
        let mut snap = snapshot();
        let err = snap
            .apply_attribute(ATTR_EFFECT_IDS, &AttrValue::StrList(vec![String::new()]))
            .expect_err("empty effect ids are invalid");
        assert!(matches!(err, AttrError::InvalidEffectId { .. }));
        assert!(snap.effect_ids.is_empty());
    }
}
