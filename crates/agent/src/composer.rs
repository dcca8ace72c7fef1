//! The prompt composer — builds the two-message request for one step.
//!
//! Message order is a pinned contract: the per-phase state message (role
//! `user`) comes first, the system message second, because the model in use
//! is prompt-primed on the later-in-array content. The system message is a
//! deep copy of the configured system prompt extended with live
//! `working_memory` and `storage` snapshots.

use pagemind_core::Value;
use pagemind_core::error::Result;
use pagemind_core::provider::{ChatMessage, ChatRequest};
use pagemind_config::AgentConfig;

use crate::state::AgentState;

/// Compose the request body for the current phase.
pub fn compose_request(config: &AgentConfig, state: &AgentState) -> Result<ChatRequest> {
    let state_prompt = config.prompts.for_phase(state.phase);
    let state_content = state_prompt.to_json()?;

    let system_content = system_with_snapshot(
        &config.prompts.system,
        &state.working_memory,
        &state.storage,
    )?;

    Ok(ChatRequest {
        model: config.model.clone(),
        temperature: config.temperature,
        messages: vec![
            ChatMessage::user(state_content),
            ChatMessage::system(system_content),
        ],
    })
}

/// Deep-copy the system prompt and graft the memory snapshot onto it.
/// A non-object system prompt is wrapped so the snapshot always has a
/// place to live.
fn system_with_snapshot(system: &Value, working_memory: &Value, storage: &Value) -> Result<String> {
    let mut prompt = if system.is_object() {
        system.clone()
    } else {
        let mut wrapped = Value::object();
        wrapped.insert("system", system.clone());
        wrapped
    };
    prompt.insert("working_memory", working_memory.clone());
    prompt.insert("storage", storage.clone());
    Ok(prompt.to_json()?)
}
