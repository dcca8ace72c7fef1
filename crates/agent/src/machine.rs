//! The phase machine — one `step()` per model round-trip.
//!
//! A step composes the request for the current phase, posts it, parses the
//! response into directives, mutates memory, and finally moves the phase.
//! The HTTP round-trip is the only await point; all state mutation happens
//! between suspensions, so a single agent needs no locking. The on-disk
//! files are guarded by a file lock held for the whole step.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{debug, info, warn};

use pagemind_core::error::Result;
use pagemind_core::{ChatProvider, Phase};
use pagemind_config::AgentConfig;
use pagemind_memory::{EvictionPolicy, MemoryFiles};

use crate::composer;
use crate::mutator::{self, MutatorLimits};
use crate::parser;
use crate::state::AgentState;

/// One autonomous agent: configuration, endpoint, state, and persistence.
pub struct Agent {
    config: AgentConfig,
    provider: Arc<dyn ChatProvider>,
    state: AgentState,
    files: MemoryFiles,
    policy: EvictionPolicy,
    iterations: u64,
}

impl Agent {
    pub fn new(config: AgentConfig, provider: Arc<dyn ChatProvider>) -> Self {
        let state = AgentState::new(config.initial_phase);
        let files = MemoryFiles::new(&config.memory_path, &config.directory_path);
        Self {
            config,
            provider,
            state,
            files,
            policy: EvictionPolicy::new(),
            iterations: 0,
        }
    }

    /// Swap the eviction scorer.
    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    fn limits(&self) -> MutatorLimits {
        MutatorLimits {
            max_active_bytes: self.config.hard_limit_bytes,
            max_thinking_logs: self.config.max_thinking_logs,
            max_evaluation_logs: self.config.max_evaluation_logs,
        }
    }

    /// Restore memory from the on-disk files, if they exist.
    pub fn load_persisted(&mut self) -> Result<()> {
        let _lock = self.files.lock()?;
        self.files.load(&mut self.state.memory)?;
        self.state.sync_with_directory()?;
        info!(
            entries = self.state.memory.directory().total_count(),
            "Restored persisted memory"
        );
        Ok(())
    }

    /// One full iteration of the cognition loop.
    ///
    /// Any error aborts the step but preserves already-applied directive
    /// effects; the endpoint sees them reflected in the next snapshot.
    pub async fn step(&mut self) -> Result<()> {
        let _lock = self.files.lock()?;
        let now = Utc::now().timestamp();
        let phase = self.state.phase;

        let request = composer::compose_request(&self.config, &self.state)?;
        debug!(%phase, "Dispatching step request");

        let text = self.provider.complete(request).await?;
        let parsed = parser::parse_response(&text)?;
        debug!(
            directives = parsed.directives.len(),
            next = ?parsed.next_phase,
            "Parsed response"
        );

        let limits = self.limits();
        mutator::apply(&mut self.state, &parsed, limits, now)?;
        self.transition(parsed.next_phase, phase, now)?;

        // Advisory budget check after the step settles.
        let usage = self
            .policy
            .calculate_window(&self.state.memory, self.config.hard_limit_bytes);
        if usage.over_budget {
            warn!(used = usage.used, "Memory over hard budget, managing overflow");
            self.policy.manage_overflow(
                &mut self.state.memory,
                self.state.phase,
                now,
                self.config.hard_limit_bytes,
            )?;
            self.state.sync_with_directory()?;
        }

        self.files.save(&self.state.memory)?;
        self.iterations += 1;
        Ok(())
    }

    /// Apply the phase transition, with two overrides:
    /// - an oversized working-memory snapshot forces a pass through Paging
    ///   and runs the overflow manager before honoring the request;
    /// - an Evaluating step that names no next state falls back to
    ///   Thinking.
    fn transition(&mut self, requested: Option<Phase>, phase_before: Phase, now: i64) -> Result<()> {
        if self.state.snapshot_len()? > self.config.soft_limit_bytes {
            info!(
                requested = ?requested,
                "Working memory over soft limit, forcing paging"
            );
            self.state.phase = Phase::Paging;
            self.policy.manage_overflow(
                &mut self.state.memory,
                Phase::Paging,
                now,
                self.config.hard_limit_bytes,
            )?;
            self.state.sync_with_directory()?;
            self.state.phase = requested.unwrap_or(Phase::Thinking);
            return Ok(());
        }

        match requested {
            Some(next) => self.state.phase = next,
            None if phase_before == Phase::Evaluating => self.state.phase = Phase::Thinking,
            None => {}
        }
        Ok(())
    }

    /// Step until `cancel` is set. The signal is checked between steps; a
    /// step in progress completes or fails via the HTTP deadline.
    ///
    /// The first step failure ends the run; callers wanting retry or
    /// back-off wrap `step()` themselves.
    pub async fn run(&mut self, cancel: Arc<AtomicBool>) -> Result<u64> {
        let mut steps = 0;
        while !cancel.load(Ordering::Relaxed) {
            self.step().await?;
            steps += 1;
        }
        info!(steps, "Run cancelled");
        Ok(steps)
    }
}
