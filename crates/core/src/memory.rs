//! Shared memory-subsystem types: tiers, directory entries, sort orders.
//!
//! The concrete store and directory live in `pagemind-memory`; the types here
//! are shared because the directive pipeline and the persistence format both
//! speak them.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Hard ceiling on directory entries, matching the fixed-size key table the
/// on-disk format was designed around.
pub const MAX_DIRECTORY_ENTRIES: usize = 1024;

/// Entries at or above this importance are never auto-evicted.
pub const STICKY_IMPORTANCE: u8 = 80;

/// Longest store key the frame format accepts.
pub const MAX_KEY_LEN: usize = 63;

/// The logical residence of a key-value pair.
///
/// `Archived` shares the persistent byte layer; it exists only as a directory
/// marker. Serialized as the layer codes `0 | 1 | 2` for interop with
/// existing directory files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Working,
    Persistent,
    Archived,
}

impl Tier {
    /// The on-disk layer code.
    pub fn layer_code(self) -> u8 {
        match self {
            Tier::Working => 0,
            Tier::Persistent => 1,
            Tier::Archived => 2,
        }
    }

    /// Decode an on-disk layer code.
    pub fn from_layer_code(code: u8) -> Option<Tier> {
        match code {
            0 => Some(Tier::Working),
            1 => Some(Tier::Persistent),
            2 => Some(Tier::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Tier::Working => "working",
            Tier::Persistent => "persistent",
            Tier::Archived => "archived",
        })
    }
}

impl Serialize for Tier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.layer_code())
    }
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Tier::from_layer_code(code)
            .ok_or_else(|| D::Error::custom(format!("invalid layer code {code}")))
    }
}

/// One row of the context directory.
///
/// Field names follow the on-disk directory file so the JSON array
/// round-trips without a translation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Store key, 1-63 bytes of `[A-Za-z0-9_]`, unique within the directory.
    pub key: String,

    /// Logical tier.
    #[serde(rename = "layer")]
    pub tier: Tier,

    /// Importance in `[0, 100]`. Values past 100 are clamped on write.
    #[serde(rename = "importance_score")]
    pub importance: u8,

    /// Unix seconds of the last retrieval or replacement.
    #[serde(rename = "last_accessed")]
    pub last_access: i64,

    /// Serialized length of the stored value.
    #[serde(rename = "data_size")]
    pub size_bytes: u64,
}

impl DirectoryEntry {
    /// Build an entry with clamped importance.
    pub fn new(key: impl Into<String>, tier: Tier, importance: u8, now: i64, size_bytes: u64) -> Self {
        Self {
            key: key.into(),
            tier,
            importance: importance.min(100),
            last_access: now,
            size_bytes,
        }
    }

    /// Refresh the access timestamp. Time never moves backwards within an
    /// iteration, so the max keeps `last_access` monotonic.
    pub fn touch(&mut self, now: i64) {
        self.last_access = self.last_access.max(now);
    }

    /// Set importance, clamping to 100.
    pub fn set_importance(&mut self, importance: u8) {
        self.importance = importance.min(100);
    }

    /// Whether automatic eviction must leave this entry alone.
    pub fn is_sticky(&self) -> bool {
        self.importance >= STICKY_IMPORTANCE
    }
}

/// Orderings for [`list_by_tier`]-style queries. Ties are broken by
/// insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    ByImportanceDesc,
    ByAccessRecencyDesc,
}

/// Check a store key against the frame-format restrictions:
/// 1-63 bytes of `[A-Za-z0-9_]`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_codes_roundtrip() {
        for tier in [Tier::Working, Tier::Persistent, Tier::Archived] {
            assert_eq!(Tier::from_layer_code(tier.layer_code()), Some(tier));
        }
        assert_eq!(Tier::from_layer_code(3), None);
    }

    #[test]
    fn entry_serializes_with_on_disk_field_names() {
        let entry = DirectoryEntry::new("task_plan", Tier::Persistent, 70, 1_700_000_000, 128);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"layer\":1"));
        assert!(json.contains("\"importance_score\":70"));
        assert!(json.contains("\"last_accessed\":1700000000"));
        assert!(json.contains("\"data_size\":128"));
    }

    #[test]
    fn importance_is_clamped_not_rejected() {
        let mut entry = DirectoryEntry::new("k", Tier::Working, 250, 0, 0);
        assert_eq!(entry.importance, 100);
        entry.set_importance(101);
        assert_eq!(entry.importance, 100);
    }

    #[test]
    fn touch_is_monotonic() {
        let mut entry = DirectoryEntry::new("k", Tier::Working, 50, 100, 0);
        entry.touch(200);
        assert_eq!(entry.last_access, 200);
        entry.touch(150);
        assert_eq!(entry.last_access, 200);
    }

    #[test]
    fn key_validation() {
        assert!(is_valid_key("a"));
        assert!(is_valid_key("task_plan_2"));
        assert!(is_valid_key(&"x".repeat(63)));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(&"x".repeat(64)));
        assert!(!is_valid_key("has space"));
        assert!(!is_valid_key("slash/key"));
        assert!(!is_valid_key("</key>"));
    }

    #[test]
    fn invalid_layer_code_fails_deserialization() {
        let result: Result<DirectoryEntry, _> = serde_json::from_str(
            r#"{"key":"k","layer":7,"importance_score":50,"last_accessed":0,"data_size":0}"#,
        );
        assert!(result.is_err());
    }
}
