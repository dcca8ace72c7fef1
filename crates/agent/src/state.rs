//! The live state of one agent: the two memory objects, the phase, and the
//! tiered store behind them.

use tracing::warn;

use pagemind_core::error::{Error, Result};
use pagemind_core::memory::Tier;
use pagemind_core::{Phase, Value};
use pagemind_memory::TieredMemory;

/// Everything one agent owns. No cross-agent references exist; running
/// several agents means several `AgentState`s on separate tasks.
#[derive(Debug)]
pub struct AgentState {
    /// The object injected into the system prompt as `working_memory`.
    /// Holds the values of Working-tier keys.
    pub working_memory: Value,
    /// The object injected as `storage`. Holds Persistent-tier values;
    /// archived keys live only in the byte store.
    pub storage: Value,
    pub phase: Phase,
    pub memory: TieredMemory,
}

impl AgentState {
    pub fn new(initial_phase: Phase) -> Self {
        Self {
            working_memory: Value::object(),
            storage: Value::object(),
            phase: initial_phase,
            memory: TieredMemory::new(),
        }
    }

    /// The object a directive op of the given tier lands in.
    pub fn object_for_tier(&mut self, tier: Tier) -> &mut Value {
        match tier {
            Tier::Working => &mut self.working_memory,
            Tier::Persistent | Tier::Archived => &mut self.storage,
        }
    }

    /// Realign the two memory objects with the directory after tier moves.
    ///
    /// Working entries belong in `working_memory`, persistent entries in
    /// `storage`, archived entries in neither. Values missing from both
    /// objects are reparsed from their frames.
    pub fn sync_with_directory(&mut self) -> Result<()> {
        let placements: Vec<(String, Tier)> = self
            .memory
            .directory()
            .iter()
            .map(|e| (e.key.clone(), e.tier))
            .collect();

        for (key, tier) in placements {
            match tier {
                Tier::Working => self.place(&key, tier, true)?,
                Tier::Persistent => self.place(&key, tier, false)?,
                Tier::Archived => {
                    self.working_memory.remove(&key);
                    self.storage.remove(&key);
                }
            }
        }

        // Drop object keys the directory no longer tracks.
        for object in [&mut self.working_memory, &mut self.storage] {
            if let Some(entries) = object.as_entries() {
                let stale: Vec<String> = entries
                    .iter()
                    .map(|(k, _)| k.clone())
                    .filter(|k| self.memory.directory().find(k).is_none())
                    .collect();
                for key in stale {
                    warn!(key, "Dropping memory object key with no directory entry");
                    object.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn place(&mut self, key: &str, tier: Tier, into_working: bool) -> Result<()> {
        let (target, other) = if into_working {
            (&mut self.working_memory, &mut self.storage)
        } else {
            (&mut self.storage, &mut self.working_memory)
        };

        if target.get(key).is_some() {
            other.remove(key);
            return Ok(());
        }
        if let Some(value) = other.remove(key) {
            target.insert(key, value);
            return Ok(());
        }

        // Neither object holds it; recover the value from its frame.
        match self.memory.store().get(tier, key)? {
            Some(body) => {
                let value = Value::parse(&body)?;
                self.object_for_tier(tier).insert(key, value);
                Ok(())
            }
            None => Err(Error::InvariantViolation(format!(
                "directory entry '{key}' has no frame in the {tier} layer"
            ))),
        }
    }

    /// Serialized length of the working-memory snapshot, the quantity the
    /// forced-paging check compares against `soft_limit_bytes`.
    pub fn snapshot_len(&self) -> Result<u64> {
        Ok(self.working_memory.to_json().map(|s| s.len() as u64)?)
    }
}
