//! The tiered memory coordinator.
//!
//! [`TieredStore`] holds bytes, [`Directory`] holds metadata; every mutation
//! must touch both or the invariant breaks (each live entry in tier T has
//! exactly one frame in T's physical layer). This type owns both halves and
//! exposes the synchronized operations the mutator and the eviction policy
//! build on.

use tracing::debug;

use pagemind_core::error::{DirectoryError, Error, Result};
use pagemind_core::memory::{DirectoryEntry, Tier};

use crate::directory::{Directory, QueryFilter};
use crate::store::TieredStore;

/// Usage counters surfaced through `stats()` and the CLI `status` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub stores: u64,
    pub retrievals: u64,
    pub deletes: u64,
    pub working_entries: usize,
    pub persistent_entries: usize,
    pub archived_entries: usize,
    pub working_bytes: u64,
    pub persistent_bytes: u64,
}

/// Result of the orphan scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanReport {
    /// Directory entries whose physical layer has no frame.
    pub entries_without_frames: Vec<String>,
    /// Frames with no directory entry.
    pub frames_without_entries: Vec<String>,
}

impl OrphanReport {
    pub fn is_clean(&self) -> bool {
        self.entries_without_frames.is_empty() && self.frames_without_entries.is_empty()
    }
}

/// Store and directory, kept consistent.
#[derive(Debug, Clone, Default)]
pub struct TieredMemory {
    store: TieredStore,
    directory: Directory,
    stores: u64,
    retrievals: u64,
    deletes: u64,
}

impl TieredMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory with a byte budget on the store and an entry budget on the
    /// directory.
    pub fn bounded(max_bytes: u64, max_entries: usize) -> Self {
        Self {
            store: TieredStore::bounded(max_bytes),
            directory: Directory::with_capacity(max_entries),
            ..Self::default()
        }
    }

    pub fn store(&self) -> &TieredStore {
        &self.store
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Insert or replace a key.
    ///
    /// A new key gets a fresh directory entry with the given tier and
    /// importance. An existing key keeps its entry (tier and importance
    /// included), refreshes `last_access`, and updates `size_bytes`.
    pub fn insert(
        &mut self,
        tier: Tier,
        key: &str,
        body: &str,
        importance: u8,
        now: i64,
    ) -> Result<()> {
        match self.directory.find(key) {
            Some(existing) => {
                let current_tier = existing.tier;
                self.store.put(current_tier, key, body)?;
                let entry = self.directory.find_mut(key).expect("entry checked above");
                entry.touch(now);
                entry.size_bytes = body.len() as u64;
            }
            None => {
                self.store.put(tier, key, body)?;
                let entry = DirectoryEntry::new(key, tier, importance, now, body.len() as u64);
                if let Err(err) = self.directory.create(entry) {
                    // Roll the frame back so the layers stay consistent.
                    self.store.delete(tier, key)?;
                    return Err(err.into());
                }
            }
        }
        self.stores += 1;
        Ok(())
    }

    /// Fetch a key's body, refreshing its access time. `Ok(None)` when the
    /// key is unknown.
    pub fn retrieve(&mut self, key: &str, now: i64) -> Result<Option<String>> {
        let Some(entry) = self.directory.find_mut(key) else {
            return Ok(None);
        };
        let tier = entry.tier;
        entry.touch(now);
        self.retrievals += 1;
        match self.store.get(tier, key)? {
            Some(body) => Ok(Some(body)),
            None => Err(Error::InvariantViolation(format!(
                "directory entry '{key}' has no frame in the {tier} layer"
            ))),
        }
    }

    /// Remove a key. Missing keys are not an error; returns whether
    /// anything was removed.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let Some(entry) = self.directory.remove(key) else {
            return Ok(false);
        };
        self.store.delete(entry.tier, key)?;
        self.deletes += 1;
        Ok(true)
    }

    /// Move a key to another tier, relocating its frame when the physical
    /// layer changes.
    pub fn move_tier(&mut self, key: &str, to: Tier) -> Result<()> {
        let entry = self
            .directory
            .find(key)
            .ok_or_else(|| DirectoryError::NotFound(key.to_string()))?;
        let from = entry.tier;
        if from == to {
            return Ok(());
        }
        self.store.move_frame(key, from, to)?;
        self.directory.move_tier(key, to)?;
        debug!(key, %from, %to, "Moved memory tier");
        Ok(())
    }

    /// Mark a key archived. Bytes stay in the persistent layer.
    pub fn archive(&mut self, key: &str) -> Result<()> {
        self.move_tier(key, Tier::Archived)
    }

    pub fn update_importance(&mut self, key: &str, importance: u8) -> Result<()> {
        self.directory.update_importance(key, importance)?;
        Ok(())
    }

    pub fn query(&self, filter: &QueryFilter) -> Vec<&DirectoryEntry> {
        self.directory.query(filter)
    }

    /// Bytes counted against the context window: everything not archived.
    pub fn active_bytes(&self) -> u64 {
        self.directory
            .iter()
            .filter(|e| e.tier != Tier::Archived)
            .map(|e| e.size_bytes)
            .sum()
    }

    /// Cross-check directory entries against live frames.
    pub fn verify(&self) -> OrphanReport {
        let mut report = OrphanReport::default();

        for entry in self.directory.iter() {
            match self.store.get(entry.tier, &entry.key) {
                Ok(Some(_)) => {}
                _ => report.entries_without_frames.push(entry.key.clone()),
            }
        }

        for tier in [Tier::Working, Tier::Persistent] {
            for key in self.store.keys(tier) {
                let entry = self.directory.find(&key);
                let accounted = entry.is_some_and(|e| {
                    e.tier == tier || (tier == Tier::Persistent && e.tier == Tier::Archived)
                });
                if !accounted {
                    report.frames_without_entries.push(key);
                }
            }
        }

        report
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            stores: self.stores,
            retrievals: self.retrievals,
            deletes: self.deletes,
            working_entries: self.directory.count_by_tier(Tier::Working),
            persistent_entries: self.directory.count_by_tier(Tier::Persistent),
            archived_entries: self.directory.count_by_tier(Tier::Archived),
            working_bytes: self.store.size(Tier::Working),
            persistent_bytes: self.store.size(Tier::Persistent),
        }
    }

    /// Swap in persisted layer bytes and directory entries, replacing the
    /// current contents.
    pub fn load(&mut self, working: String, persistent: String, entries: Vec<DirectoryEntry>) {
        self.store.load_layer(Tier::Working, working);
        self.store.load_layer(Tier::Persistent, persistent);
        self.directory.load_entries(entries);
    }
}
