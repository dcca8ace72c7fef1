//! The four phases of the agent control loop.

use serde::{Deserialize, Serialize};

use crate::error::DirectiveError;

/// The cognition phase the agent is currently in.
///
/// Phase only changes through a directive in a model response (or the forced
/// paging override when memory overflows); there are no wall-clock or
/// iteration-count transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Thinking,
    Paging,
    Evaluating,
    Executing,
}

impl Phase {
    /// The wire name used in `next_state` / `status_change` directives.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Thinking => "thinking",
            Phase::Paging => "paging",
            Phase::Evaluating => "evaluating",
            Phase::Executing => "executing",
        }
    }

    /// Parse a wire name. Unknown names are a directive error.
    pub fn parse(name: &str) -> Result<Phase, DirectiveError> {
        match name {
            "thinking" => Ok(Phase::Thinking),
            "paging" => Ok(Phase::Paging),
            "evaluating" => Ok(Phase::Evaluating),
            "executing" => Ok(Phase::Executing),
            other => Err(DirectiveError::InvalidPhase(other.to_string())),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
