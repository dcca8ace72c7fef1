//! The context directory — an ordered set of entries describing every key
//! the tiered store holds.
//!
//! Entries keep their insertion order, which is the tie-breaker for every
//! sort the eviction policy performs. The directory never touches the byte
//! store; [`crate::TieredMemory`] keeps the two in step.

use pagemind_core::error::DirectoryError;
use pagemind_core::memory::{DirectoryEntry, MAX_DIRECTORY_ENTRIES, SortOrder, Tier};

/// Filter for [`Directory::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub tier: Option<Tier>,
    pub min_importance: Option<u8>,
    pub max_importance: Option<u8>,
    /// Cap on the number of returned keys. `None` means all matches.
    pub max_results: Option<usize>,
}

/// The ordered entry table.
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
    max_entries: usize,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            max_entries: MAX_DIRECTORY_ENTRIES,
        }
    }

    /// A directory with a smaller capacity, for tests and constrained
    /// deployments.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    /// Insert a new entry. Importance is clamped by the entry constructor.
    pub fn create(&mut self, entry: DirectoryEntry) -> Result<(), DirectoryError> {
        if self.find(&entry.key).is_some() {
            return Err(DirectoryError::AlreadyExists(entry.key.clone()));
        }
        if self.entries.len() >= self.max_entries {
            return Err(DirectoryError::Full { max: self.max_entries });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn find(&self, key: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn find_mut(&mut self, key: &str) -> Option<&mut DirectoryEntry> {
        self.entries.iter_mut().find(|e| e.key == key)
    }

    /// Remove an entry, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<DirectoryEntry> {
        let idx = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(idx))
    }

    /// Set an entry's importance, clamped to `[0, 100]`.
    pub fn update_importance(&mut self, key: &str, importance: u8) -> Result<(), DirectoryError> {
        let entry = self
            .find_mut(key)
            .ok_or_else(|| DirectoryError::NotFound(key.to_string()))?;
        entry.set_importance(importance);
        Ok(())
    }

    /// Change an entry's tier.
    pub fn move_tier(&mut self, key: &str, new_tier: Tier) -> Result<(), DirectoryError> {
        let entry = self
            .find_mut(key)
            .ok_or_else(|| DirectoryError::NotFound(key.to_string()))?;
        entry.tier = new_tier;
        Ok(())
    }

    /// Mark an entry archived.
    pub fn archive(&mut self, key: &str) -> Result<(), DirectoryError> {
        self.move_tier(key, Tier::Archived)
    }

    /// Entries in a tier, sorted. Ties keep insertion order (stable sort).
    pub fn list_by_tier(&self, tier: Tier, sort_by: SortOrder) -> Vec<&DirectoryEntry> {
        let mut entries: Vec<&DirectoryEntry> =
            self.entries.iter().filter(|e| e.tier == tier).collect();
        match sort_by {
            SortOrder::ByImportanceDesc => {
                entries.sort_by(|a, b| b.importance.cmp(&a.importance));
            }
            SortOrder::ByAccessRecencyDesc => {
                entries.sort_by(|a, b| b.last_access.cmp(&a.last_access));
            }
        }
        entries
    }

    /// Keys of entries idle longer than `threshold_seconds`, skipping
    /// sticky entries and entries already archived.
    pub fn collect_expired(&self, threshold_seconds: i64, now: i64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| {
                !e.is_sticky()
                    && e.tier != Tier::Archived
                    && now - e.last_access > threshold_seconds
            })
            .map(|e| e.key.clone())
            .collect()
    }

    /// Archive or drop entries idle longer than `threshold_seconds`.
    /// Sticky entries are never touched. Returns how many entries were
    /// affected.
    ///
    /// This is directory bookkeeping only; callers that also hold frames
    /// reconcile the store with the returned keys via `collect_expired`,
    /// the way [`crate::EvictionPolicy::manage_overflow`] does.
    pub fn cleanup_expired(
        &mut self,
        threshold_seconds: i64,
        archive_instead_of_delete: bool,
        now: i64,
    ) -> usize {
        let expired = self.collect_expired(threshold_seconds, now);
        for key in &expired {
            if archive_instead_of_delete {
                let _ = self.archive(key);
            } else {
                self.remove(key);
            }
        }
        expired.len()
    }

    /// Filtered key lookup, in insertion order.
    pub fn query(&self, filter: &QueryFilter) -> Vec<&DirectoryEntry> {
        let mut matches: Vec<&DirectoryEntry> = self
            .entries
            .iter()
            .filter(|e| filter.tier.is_none_or(|t| e.tier == t))
            .filter(|e| filter.min_importance.is_none_or(|min| e.importance >= min))
            .filter(|e| filter.max_importance.is_none_or(|max| e.importance <= max))
            .collect();
        if let Some(cap) = filter.max_results {
            matches.truncate(cap);
        }
        matches
    }

    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    pub fn count_by_tier(&self, tier: Tier) -> usize {
        self.entries.iter().filter(|e| e.tier == tier).count()
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter()
    }

    /// Replace the whole table, for loading a persisted directory file.
    pub fn load_entries(&mut self, entries: Vec<DirectoryEntry>) {
        self.entries = entries;
    }
}
