//! Normalized directives — the single representation both response grammars
//! reduce to.
//!
//! The model speaks two dialects (a nested action form and a flat legacy
//! form). The parser in `pagemind-agent` reconciles them into a
//! [`ParsedResponse`]; everything downstream only ever sees this shape.

use crate::phase::Phase;
use crate::value::Value;

/// What a single directive does to the agent's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveOp {
    /// Insert or replace a key in working memory.
    WorkingMemoryAdd,
    /// Remove a key from working memory. Missing keys are not an error.
    WorkingMemoryRemove,
    /// Insert or replace a key in persistent storage.
    StorageAdd,
    /// Remove a key from persistent storage. Missing keys are not an error.
    StorageRemove,
}

impl DirectiveOp {
    /// The wire name used by both response grammars.
    pub fn as_str(self) -> &'static str {
        match self {
            DirectiveOp::WorkingMemoryAdd => "working_memory_add",
            DirectiveOp::WorkingMemoryRemove => "working_memory_remove",
            DirectiveOp::StorageAdd => "storage_add",
            DirectiveOp::StorageRemove => "storage_remove",
        }
    }

    /// Parse a wire name. Returns `None` for unknown action types; the
    /// caller decides whether that is an error (action form) or an ignored
    /// field (legacy form).
    pub fn parse(name: &str) -> Option<DirectiveOp> {
        match name {
            "working_memory_add" => Some(DirectiveOp::WorkingMemoryAdd),
            "working_memory_remove" => Some(DirectiveOp::WorkingMemoryRemove),
            "storage_add" => Some(DirectiveOp::StorageAdd),
            "storage_remove" => Some(DirectiveOp::StorageRemove),
            _ => None,
        }
    }

    /// Whether this op carries a value payload.
    pub fn is_add(self) -> bool {
        matches!(self, DirectiveOp::WorkingMemoryAdd | DirectiveOp::StorageAdd)
    }
}

impl std::fmt::Display for DirectiveOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One memory operation extracted from a model response.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub op: DirectiveOp,
    /// Store key; for the action form this is the underscore-join of the
    /// tag list.
    pub key: String,
    /// Present for add ops, absent for removes.
    pub value: Option<Value>,
}

impl Directive {
    pub fn add(op: DirectiveOp, key: impl Into<String>, value: Value) -> Self {
        Self {
            op,
            key: key.into(),
            value: Some(value),
        }
    }

    pub fn remove(op: DirectiveOp, key: impl Into<String>) -> Self {
        Self {
            op,
            key: key.into(),
            value: None,
        }
    }
}

/// Everything one model response asked for, in response-document order.
///
/// Directives are applied first, in order; the phase transition is applied
/// after all of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub directives: Vec<Directive>,
    /// Requested phase transition (`next_state` / `status_change`), if any.
    pub next_phase: Option<Phase>,
    /// Free-text log entry for the rotating `thinking_log_NNN` slots.
    pub thinking_log: Option<String>,
    /// Free-text log entry for the `evaluation_log_NNN` slots.
    pub evaluation_log: Option<String>,
}

impl ParsedResponse {
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
            && self.next_phase.is_none()
            && self.thinking_log.is_none()
            && self.evaluation_log.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_wire_names_roundtrip() {
        for op in [
            DirectiveOp::WorkingMemoryAdd,
            DirectiveOp::WorkingMemoryRemove,
            DirectiveOp::StorageAdd,
            DirectiveOp::StorageRemove,
        ] {
            assert_eq!(DirectiveOp::parse(op.as_str()), Some(op));
        }
        assert_eq!(DirectiveOp::parse("memory_defrag"), None);
    }

    #[test]
    fn add_ops_carry_values() {
        assert!(DirectiveOp::WorkingMemoryAdd.is_add());
        assert!(DirectiveOp::StorageAdd.is_add());
        assert!(!DirectiveOp::WorkingMemoryRemove.is_add());
        assert!(!DirectiveOp::StorageRemove.is_add());
    }

    #[test]
    fn empty_response_is_empty() {
        assert!(ParsedResponse::default().is_empty());
        let response = ParsedResponse {
            next_phase: Some(Phase::Paging),
            ..Default::default()
        };
        assert!(!response.is_empty());
    }
}
