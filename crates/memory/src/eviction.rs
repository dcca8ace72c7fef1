//! Context-window accounting and the eviction policy.
//!
//! Every directory entry gets a phase-dependent priority; low-priority
//! entries are demoted (Working → Persistent) or archived when the window
//! runs over budget. The scorer is stateless: identical inputs produce
//! identical scores, and all time-dependent operations take `now`
//! explicitly so the whole policy is deterministic under test.

use tracing::{debug, info};

use pagemind_core::Phase;
use pagemind_core::error::Result;
use pagemind_core::memory::{DirectoryEntry, Tier};

use crate::directory::QueryFilter;
use crate::tiered::TieredMemory;

/// Demotions below this fraction of the budget stop.
const TRIM_TARGET_RATIO: f64 = 0.9;

/// Entries idle longer than this are expired by the overflow manager.
const OVERFLOW_EXPIRY_SECONDS: i64 = 7 * 86_400;

/// Working entries at or below this importance are demoted by overflow
/// step two.
const OVERFLOW_DEMOTE_IMPORTANCE: u8 = 60;

/// Access within this window counts as recent for `trim` protection and
/// the recency boost.
const RECENT_WINDOW_SECONDS: i64 = 3_600;

/// Priority bonus that shields recently-accessed entries during `trim`.
const PRESERVE_RECENT_BONUS: f64 = 50.0;

/// Assigns a priority to a directory entry for the current phase.
///
/// Must be stateless: the same `(entry, phase, now)` always yields the same
/// score.
pub trait PriorityScorer: Send + Sync {
    fn score(&self, entry: &DirectoryEntry, phase: Phase, now: i64) -> f64;
}

/// The built-in scorer: weighted importance, recency, tier fit, and size.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseScorer;

impl PhaseScorer {
    fn recency_bucket(age_seconds: i64) -> f64 {
        if age_seconds < 300 {
            30.0
        } else if age_seconds < 3_600 {
            25.0
        } else if age_seconds < 86_400 {
            20.0
        } else if age_seconds < 604_800 {
            15.0
        } else {
            10.0
        }
    }

    fn tier_weight(phase: Phase, tier: Tier) -> f64 {
        match (phase, tier) {
            (Phase::Thinking, Tier::Working) => 20.0,
            (Phase::Thinking, Tier::Persistent) => 15.0,
            (Phase::Thinking, Tier::Archived) => 10.0,
            (Phase::Executing, Tier::Working) => 25.0,
            (Phase::Executing, Tier::Persistent) => 10.0,
            (Phase::Executing, Tier::Archived) => 5.0,
            (Phase::Evaluating, Tier::Working) => 20.0,
            (Phase::Evaluating, Tier::Persistent) => 20.0,
            (Phase::Evaluating, Tier::Archived) => 15.0,
            (Phase::Paging, _) => 15.0,
        }
    }

    fn size_bucket(size_bytes: u64) -> f64 {
        if size_bytes < 512 {
            10.0
        } else if size_bytes < 2_048 {
            8.0
        } else if size_bytes < 8_192 {
            6.0
        } else {
            4.0
        }
    }
}

impl PriorityScorer for PhaseScorer {
    fn score(&self, entry: &DirectoryEntry, phase: Phase, now: i64) -> f64 {
        let age = now - entry.last_access;
        0.4 * f64::from(entry.importance)
            + 0.3 * Self::recency_bucket(age)
            + 0.2 * Self::tier_weight(phase, entry.tier)
            + 0.1 * Self::size_bucket(entry.size_bytes)
    }
}

/// Window usage as reported by [`EvictionPolicy::calculate_window`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowUsage {
    pub used: u64,
    pub percent: f64,
    pub over_budget: bool,
}

/// The trim/prioritize/overflow paths over a [`TieredMemory`].
pub struct EvictionPolicy {
    scorer: Box<dyn PriorityScorer>,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            scorer: Box::new(PhaseScorer),
        }
    }
}

impl EvictionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a custom scorer.
    pub fn with_scorer(scorer: Box<dyn PriorityScorer>) -> Self {
        Self { scorer }
    }

    pub fn score(&self, entry: &DirectoryEntry, phase: Phase, now: i64) -> f64 {
        self.scorer.score(entry, phase, now)
    }

    /// Usage of the advisory context budget. Archived bytes do not count.
    pub fn calculate_window(&self, memory: &TieredMemory, max_bytes: u64) -> WindowUsage {
        let used = memory.active_bytes();
        let percent = if max_bytes == 0 {
            100.0
        } else {
            used as f64 * 100.0 / max_bytes as f64
        };
        WindowUsage {
            used,
            percent,
            over_budget: used > max_bytes,
        }
    }

    /// Demote or archive entries, lowest priority first, until usage drops
    /// to 90% of `max_bytes`. Sticky entries are never touched. With
    /// `preserve_recent`, entries accessed within the last hour get a +50
    /// priority bonus, pushing them to the back of the eviction line.
    ///
    /// Returns the number of demote/archive actions taken.
    pub fn trim(
        &self,
        memory: &mut TieredMemory,
        phase: Phase,
        now: i64,
        max_bytes: u64,
        preserve_recent: bool,
    ) -> Result<usize> {
        let target = max_bytes as f64 * TRIM_TARGET_RATIO;

        let mut candidates: Vec<(String, Tier, f64)> = memory
            .directory()
            .iter()
            .filter(|e| !e.is_sticky() && e.tier != Tier::Archived)
            .map(|e| {
                let mut priority = self.scorer.score(e, phase, now);
                if preserve_recent && now - e.last_access < RECENT_WINDOW_SECONDS {
                    priority += PRESERVE_RECENT_BONUS;
                }
                (e.key.clone(), e.tier, priority)
            })
            .collect();
        // Stable sort keeps insertion order across equal priorities.
        candidates.sort_by(|a, b| a.2.total_cmp(&b.2));

        let mut actions = 0;
        for (key, tier, _) in candidates {
            if memory.active_bytes() as f64 <= target {
                break;
            }
            match tier {
                Tier::Working => memory.move_tier(&key, Tier::Persistent)?,
                Tier::Persistent => memory.archive(&key)?,
                Tier::Archived => continue,
            }
            actions += 1;
        }

        if actions > 0 {
            debug!(actions, "Trimmed context window");
        }
        Ok(actions)
    }

    /// Re-rank everything by priority: the top ⌈max_keys/2⌉ entries stay in
    /// (or return to) Working, the next ⌊max_keys/2⌋ go to Persistent, and
    /// the rest are archived. Returns the number of tier moves.
    pub fn prioritize(
        &self,
        memory: &mut TieredMemory,
        phase: Phase,
        now: i64,
        max_keys: usize,
    ) -> Result<usize> {
        let mut ranked: Vec<(String, f64)> = memory
            .directory()
            .iter()
            .map(|e| (e.key.clone(), self.scorer.score(e, phase, now)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let working_quota = max_keys.div_ceil(2);
        let mut moves = 0;
        for (rank, (key, _)) in ranked.iter().enumerate() {
            let target = if rank < working_quota {
                Tier::Working
            } else if rank < max_keys {
                Tier::Persistent
            } else {
                Tier::Archived
            };
            let current = memory.directory().find(key).map(|e| e.tier);
            if current != Some(target) {
                memory.move_tier(key, target)?;
                moves += 1;
            }
        }
        Ok(moves)
    }

    /// The progressive overflow path: expire old entries, demote
    /// low-importance working entries, then trim.
    pub fn manage_overflow(
        &self,
        memory: &mut TieredMemory,
        phase: Phase,
        now: i64,
        max_bytes: u64,
    ) -> Result<usize> {
        let mut actions = 0;

        // 1. Archive everything idle past the expiry window.
        let expired = memory.directory().collect_expired(OVERFLOW_EXPIRY_SECONDS, now);
        for key in expired {
            memory.archive(&key)?;
            actions += 1;
        }

        // 2. Demote disposable working entries.
        let demotable: Vec<String> = memory
            .query(&QueryFilter {
                tier: Some(Tier::Working),
                max_importance: Some(OVERFLOW_DEMOTE_IMPORTANCE),
                ..Default::default()
            })
            .iter()
            .map(|e| e.key.clone())
            .collect();
        for key in demotable {
            memory.move_tier(&key, Tier::Persistent)?;
            actions += 1;
        }

        // 3. Trim whatever is still over budget, shielding recent entries.
        actions += self.trim(memory, phase, now, max_bytes, true)?;

        info!(actions, "Overflow managed");
        Ok(actions)
    }

    /// Pull recently-used entries back into Working and boost their
    /// importance by +20 (entries already at 70+ keep their score).
    /// Returns the number of entries touched.
    pub fn boost_recent(
        &self,
        memory: &mut TieredMemory,
        threshold_seconds: i64,
        now: i64,
    ) -> Result<usize> {
        let recent: Vec<(String, u8, Tier)> = memory
            .directory()
            .iter()
            .filter(|e| now - e.last_access < threshold_seconds)
            .map(|e| (e.key.clone(), e.importance, e.tier))
            .collect();

        let count = recent.len();
        for (key, importance, tier) in recent {
            if tier != Tier::Working {
                memory.move_tier(&key, Tier::Working)?;
            }
            if importance < 70 {
                memory.update_importance(&key, importance.saturating_add(20))?;
            }
        }
        Ok(count)
    }
}
