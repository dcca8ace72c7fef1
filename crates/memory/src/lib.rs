//! # Pagemind Memory
//!
//! The two-tier memory subsystem: a byte store of key-delimited frames, the
//! context directory that indexes it, the importance-based eviction policy,
//! and on-disk persistence with atomic writes and file locking.
//!
//! The pieces compose bottom-up:
//! - [`TieredStore`] — append-only frame buffers, one per physical layer.
//! - [`Directory`] — the ordered `(key, tier, importance, last_access,
//!   size)` table.
//! - [`TieredMemory`] — the coordinator that keeps the two consistent.
//! - [`EvictionPolicy`] — context-window accounting, trim, prioritize, and
//!   the progressive overflow path.
//! - [`MemoryFiles`] — the `memory` / `directory` file pair on disk.

pub mod directory;
pub mod eviction;
pub mod persist;
pub mod store;
pub mod tiered;

pub use directory::{Directory, QueryFilter};
pub use eviction::{EvictionPolicy, PhaseScorer, PriorityScorer, WindowUsage};
pub use persist::{FileLock, MemoryFile, MemoryFiles, atomic_write};
pub use store::TieredStore;
pub use tiered::{MemoryStats, OrphanReport, TieredMemory};
