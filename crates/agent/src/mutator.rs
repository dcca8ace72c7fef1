//! The memory mutator — applies a parsed response to the agent state.
//!
//! Directives are applied in response-document order; the first failure
//! aborts the rest, leaving earlier effects in place so the model can
//! observe partial success on the next iteration. Phase transitions are
//! NOT applied here; the phase machine owns them because overflow can
//! override the requested state.

use tracing::debug;

use pagemind_core::error::{Error, Result, StoreError};
use pagemind_core::memory::{Tier, is_valid_key};
use pagemind_core::{Directive, DirectiveOp, ParsedResponse, Value};

use crate::state::AgentState;

/// Importance a key gets when its directory entry is first created.
const DEFAULT_IMPORTANCE: u8 = 50;

/// Limits the mutator enforces per step.
#[derive(Debug, Clone, Copy)]
pub struct MutatorLimits {
    /// Ceiling on non-archived bytes; an add that would cross it fails
    /// with `OutOfCapacity`.
    pub max_active_bytes: u64,
    pub max_thinking_logs: u32,
    pub max_evaluation_logs: u32,
}

/// Apply every directive, then the log entries. `now` is the wall clock of
/// the enclosing step, shared so `last_access` stays monotonic within one
/// iteration.
pub fn apply(
    state: &mut AgentState,
    response: &ParsedResponse,
    limits: MutatorLimits,
    now: i64,
) -> Result<()> {
    for directive in &response.directives {
        apply_directive(state, directive, limits, now)?;
    }

    if let Some(entry) = &response.thinking_log {
        rotate_thinking_log(state, entry, limits, now)?;
    }
    if let Some(entry) = &response.evaluation_log {
        append_evaluation_log(state, entry, limits, now)?;
    }
    Ok(())
}

fn apply_directive(
    state: &mut AgentState,
    directive: &Directive,
    limits: MutatorLimits,
    now: i64,
) -> Result<()> {
    if !is_valid_key(&directive.key) {
        return Err(StoreError::InvalidKey {
            key: directive.key.clone(),
        }
        .into());
    }

    match directive.op {
        DirectiveOp::WorkingMemoryAdd => {
            let value = directive.value.clone().unwrap_or(Value::Null);
            add(state, Tier::Working, &directive.key, value, limits, now)
        }
        DirectiveOp::StorageAdd => {
            let value = directive.value.clone().unwrap_or(Value::Null);
            add(state, Tier::Persistent, &directive.key, value, limits, now)
        }
        DirectiveOp::WorkingMemoryRemove | DirectiveOp::StorageRemove => {
            remove(state, &directive.key)
        }
    }
}

/// Insert or replace a key. The directory entry is created on first insert
/// with default importance; a replace keeps the entry (tier included) and
/// refreshes access time and size.
fn add(
    state: &mut AgentState,
    tier: Tier,
    key: &str,
    value: Value,
    limits: MutatorLimits,
    now: i64,
) -> Result<()> {
    let body = value.to_json()?;

    let replaced_size = state
        .memory
        .directory()
        .find(key)
        .filter(|e| e.tier != Tier::Archived)
        .map(|e| e.size_bytes)
        .unwrap_or(0);
    let projected =
        state.memory.active_bytes().saturating_sub(replaced_size) + body.len() as u64;
    if projected > limits.max_active_bytes {
        return Err(Error::Store(StoreError::OutOfCapacity {
            key: key.to_string(),
            size: body.len() as u64,
            max: limits.max_active_bytes,
        }));
    }

    state.memory.insert(tier, key, &body, DEFAULT_IMPORTANCE, now)?;

    // The entry's tier wins over the op's tier for an existing key.
    let landed = state
        .memory
        .directory()
        .find(key)
        .map(|e| e.tier)
        .unwrap_or(tier);
    match landed {
        Tier::Working => {
            state.storage.remove(key);
        }
        Tier::Persistent | Tier::Archived => {
            state.working_memory.remove(key);
        }
    }
    state.object_for_tier(landed).insert(key, value);

    debug!(key, tier = %landed, bytes = body.len(), "Memory add applied");
    Ok(())
}

/// Remove a key everywhere it might live. Missing keys are not an error;
/// the model issues speculative removes.
fn remove(state: &mut AgentState, key: &str) -> Result<()> {
    let existed = state.memory.remove(key)?;
    state.working_memory.remove(key);
    state.storage.remove(key);
    if existed {
        debug!(key, "Memory remove applied");
    }
    Ok(())
}

fn log_key(prefix: &str, index: u32) -> String {
    format!("{prefix}_{index:03}")
}

fn highest_occupied(state: &AgentState, prefix: &str, max: u32) -> u32 {
    (1..=max)
        .filter(|i| state.memory.directory().find(&log_key(prefix, *i)).is_some())
        .max()
        .unwrap_or(0)
}

/// Store a thinking-log entry into the rotating `thinking_log_NNN` slots.
/// When all slots are full, every entry shifts down one slot and the new
/// entry lands in the last.
fn rotate_thinking_log(
    state: &mut AgentState,
    entry: &str,
    limits: MutatorLimits,
    now: i64,
) -> Result<()> {
    let max = limits.max_thinking_logs;
    let mut next = highest_occupied(state, "thinking_log", max) + 1;

    if next > max {
        for i in 1..max {
            if let Some(moved) = state.memory.retrieve(&log_key("thinking_log", i + 1), now)? {
                let value = Value::parse(&moved)?;
                add(state, Tier::Working, &log_key("thinking_log", i), value, limits, now)?;
            }
        }
        next = max;
    }

    add(
        state,
        Tier::Working,
        &log_key("thinking_log", next),
        Value::text(entry),
        limits,
        now,
    )
}

/// Store an evaluation-log entry. Slots fill in order; once full, the last
/// slot is overwritten.
fn append_evaluation_log(
    state: &mut AgentState,
    entry: &str,
    limits: MutatorLimits,
    now: i64,
) -> Result<()> {
    let max = limits.max_evaluation_logs;
    let next = (highest_occupied(state, "evaluation_log", max) + 1).min(max);
    add(
        state,
        Tier::Working,
        &log_key("evaluation_log", next),
        Value::text(entry),
        limits,
        now,
    )
}
