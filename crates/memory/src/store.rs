//! The tiered byte store — append-only key-delimited frames.
//!
//! Two physical layers (working, persistent) each hold zero or more frames:
//!
//! ```text
//! \n<key:NAME>\n<body>\n</key>\n
//! ```
//!
//! Lookup is a linear scan for the literal `<key:NAME>` marker; the first
//! match wins. This keeps the layer bytes identical to the on-disk memory
//! file, so a layer can be persisted and reloaded verbatim. Bodies are
//! canonical JSON, whose pinned `\/` escape guarantees `</key>` never
//! appears inside a frame body.
//!
//! Archived entries live physically in the persistent layer; only the
//! directory knows the difference.

use pagemind_core::error::StoreError;
use pagemind_core::memory::{Tier, is_valid_key};

/// One physical layer: a frame buffer plus its live frame count.
#[derive(Debug, Clone, Default)]
struct Layer {
    buffer: String,
}

impl Layer {
    fn marker(key: &str) -> String {
        format!("<key:{key}>")
    }

    /// Byte range of the whole frame for `key`, and of its body.
    fn locate(&self, key: &str) -> Result<Option<(std::ops::Range<usize>, std::ops::Range<usize>)>, StoreError> {
        let marker = Self::marker(key);
        let Some(marker_pos) = self.buffer.find(&marker) else {
            return Ok(None);
        };

        let body_start = marker_pos + marker.len() + 1; // past "<key:K>\n"
        if body_start > self.buffer.len() || !self.buffer[marker_pos + marker.len()..].starts_with('\n') {
            return Err(StoreError::FrameCorrupt { key: key.to_string() });
        }

        let Some(end_rel) = self.buffer[body_start..].find("\n</key>\n") else {
            return Err(StoreError::FrameCorrupt { key: key.to_string() });
        };
        let body_end = body_start + end_rel;
        let frame_end = body_end + "\n</key>\n".len();

        // The frame owns its leading newline when one precedes the marker.
        let frame_start = if marker_pos > 0 && self.buffer.as_bytes()[marker_pos - 1] == b'\n' {
            marker_pos - 1
        } else {
            marker_pos
        };

        Ok(Some((frame_start..frame_end, body_start..body_end)))
    }

    fn append(&mut self, key: &str, body: &str) {
        self.buffer.push('\n');
        self.buffer.push_str(&Self::marker(key));
        self.buffer.push('\n');
        self.buffer.push_str(body);
        self.buffer.push_str("\n</key>\n");
    }

    /// Every key that has a frame in this layer, in buffer order.
    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        let mut rest = self.buffer.as_str();
        while let Some(start) = rest.find("<key:") {
            let after = &rest[start + "<key:".len()..];
            let Some(end) = after.find('>') else { break };
            keys.push(after[..end].to_string());
            rest = &after[end..];
        }
        keys
    }
}

/// The size a frame adds to a layer.
fn frame_len(key: &str, body: &str) -> u64 {
    // "\n<key:" + K + ">\n" + body + "\n</key>\n"
    (key.len() + body.len() + 16) as u64
}

/// The two-layer byte store.
#[derive(Debug, Clone, Default)]
pub struct TieredStore {
    working: Layer,
    persistent: Layer,
    /// Total byte budget across both layers. `None` means unbounded.
    capacity: Option<u64>,
}

impl TieredStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects `put`s that would push the combined layer size
    /// past `max_bytes`.
    pub fn bounded(max_bytes: u64) -> Self {
        Self {
            capacity: Some(max_bytes),
            ..Self::default()
        }
    }

    fn layer(&self, tier: Tier) -> &Layer {
        match tier {
            Tier::Working => &self.working,
            // Archived shares the persistent layer.
            Tier::Persistent | Tier::Archived => &self.persistent,
        }
    }

    fn layer_mut(&mut self, tier: Tier) -> &mut Layer {
        match tier {
            Tier::Working => &mut self.working,
            Tier::Persistent | Tier::Archived => &mut self.persistent,
        }
    }

    /// Append a frame. An existing frame for the key in the same layer is
    /// excised first, so a key has at most one live frame per layer.
    pub fn put(&mut self, tier: Tier, key: &str, body: &str) -> Result<(), StoreError> {
        if !is_valid_key(key) {
            return Err(StoreError::InvalidKey { key: key.to_string() });
        }

        let replaced = self.layer(tier).locate(key)?.map(|(frame, _)| frame.len() as u64);
        if let Some(max) = self.capacity {
            let projected = self.total_bytes() - replaced.unwrap_or(0) + frame_len(key, body);
            if projected > max {
                return Err(StoreError::OutOfCapacity {
                    key: key.to_string(),
                    size: frame_len(key, body),
                    max,
                });
            }
        }

        if replaced.is_some() {
            self.delete(tier, key)?;
        }
        self.layer_mut(tier).append(key, body);
        Ok(())
    }

    /// Scan for the frame and return its body. `Ok(None)` when no frame
    /// exists; `FrameCorrupt` when the end marker is missing.
    pub fn get(&self, tier: Tier, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .layer(tier)
            .locate(key)?
            .map(|(_, body)| self.layer(tier).buffer[body].to_string()))
    }

    /// Excise the frame. Returns whether a frame was removed.
    pub fn delete(&mut self, tier: Tier, key: &str) -> Result<bool, StoreError> {
        let located = self.layer(tier).locate(key)?;
        match located {
            Some((frame, _)) => {
                self.layer_mut(tier).buffer.replace_range(frame, "");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move a frame between tiers: read, write into the target, then excise
    /// from the source. If the target write fails the store is unchanged.
    /// Moving within the same physical layer is a no-op.
    ///
    /// Returns whether a frame was moved.
    pub fn move_frame(&mut self, key: &str, from: Tier, to: Tier) -> Result<bool, StoreError> {
        if std::ptr::eq(self.layer(from), self.layer(to)) {
            return Ok(self.layer(from).locate(key)?.is_some());
        }
        let Some(body) = self.get(from, key)? else {
            return Ok(false);
        };
        self.put(to, key, &body)?;
        self.delete(from, key)?;
        Ok(true)
    }

    /// Byte size of the layer backing `tier`.
    pub fn size(&self, tier: Tier) -> u64 {
        self.layer(tier).buffer.len() as u64
    }

    /// Combined byte size of both layers.
    pub fn total_bytes(&self) -> u64 {
        (self.working.buffer.len() + self.persistent.buffer.len()) as u64
    }

    /// Keys with a live frame in the layer backing `tier`, in buffer order.
    pub fn keys(&self, tier: Tier) -> Vec<String> {
        self.layer(tier).keys()
    }

    /// Raw layer bytes, for persistence.
    pub fn layer_contents(&self, tier: Tier) -> &str {
        &self.layer(tier).buffer
    }

    /// Replace a layer's bytes wholesale, for loading a persisted store.
    pub fn load_layer(&mut self, tier: Tier, contents: String) {
        self.layer_mut(tier).buffer = contents;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let mut store = TieredStore::new();
        store.put(Tier::Working, "task_plan", r#"{"step":1}"#).unwrap();
        assert_eq!(
            store.get(Tier::Working, "task_plan").unwrap().as_deref(),
            Some(r#"{"step":1}"#)
        );
    }

    #[test]
    fn frame_format_is_pinned() {
        let mut store = TieredStore::new();
        store.put(Tier::Working, "k", "body").unwrap();
        assert_eq!(store.layer_contents(Tier::Working), "\n<key:k>\nbody\n</key>\n");
    }

    #[test]
    fn get_after_delete_is_none() {
        let mut store = TieredStore::new();
        store.put(Tier::Persistent, "k", "v").unwrap();
        assert!(store.delete(Tier::Persistent, "k").unwrap());
        assert_eq!(store.get(Tier::Persistent, "k").unwrap(), None);
        assert!(!store.delete(Tier::Persistent, "k").unwrap());
    }

    #[test]
    fn delete_excises_only_the_target_frame() {
        let mut store = TieredStore::new();
        store.put(Tier::Working, "a", "1").unwrap();
        store.put(Tier::Working, "b", "2").unwrap();
        store.put(Tier::Working, "c", "3").unwrap();
        store.delete(Tier::Working, "b").unwrap();
        assert_eq!(store.get(Tier::Working, "a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get(Tier::Working, "b").unwrap(), None);
        assert_eq!(store.get(Tier::Working, "c").unwrap().as_deref(), Some("3"));
        assert_eq!(store.keys(Tier::Working), vec!["a", "c"]);
    }

    #[test]
    fn put_replaces_existing_frame() {
        let mut store = TieredStore::new();
        store.put(Tier::Working, "k", "old").unwrap();
        store.put(Tier::Working, "k", "new").unwrap();
        assert_eq!(store.get(Tier::Working, "k").unwrap().as_deref(), Some("new"));
        assert_eq!(store.keys(Tier::Working).len(), 1);
    }

    #[test]
    fn first_match_wins_on_scan() {
        let mut store = TieredStore::new();
        store.load_layer(
            Tier::Working,
            "\n<key:k>\nfirst\n</key>\n\n<key:k>\nsecond\n</key>\n".to_string(),
        );
        assert_eq!(store.get(Tier::Working, "k").unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn invalid_keys_rejected() {
        let mut store = TieredStore::new();
        for key in ["", "has space", "a/b", &"x".repeat(64)] {
            assert!(matches!(
                store.put(Tier::Working, key, "v"),
                Err(StoreError::InvalidKey { .. })
            ));
        }
    }

    #[test]
    fn missing_end_marker_is_corrupt() {
        let mut store = TieredStore::new();
        store.load_layer(Tier::Working, "\n<key:k>\nbody without end".to_string());
        assert!(matches!(
            store.get(Tier::Working, "k"),
            Err(StoreError::FrameCorrupt { .. })
        ));
    }

    #[test]
    fn archived_shares_persistent_layer() {
        let mut store = TieredStore::new();
        store.put(Tier::Archived, "k", "v").unwrap();
        assert_eq!(store.get(Tier::Persistent, "k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.size(Tier::Archived), store.size(Tier::Persistent));
    }

    #[test]
    fn move_frame_between_layers() {
        let mut store = TieredStore::new();
        store.put(Tier::Working, "k", "v").unwrap();
        assert!(store.move_frame("k", Tier::Working, Tier::Persistent).unwrap());
        assert_eq!(store.get(Tier::Working, "k").unwrap(), None);
        assert_eq!(store.get(Tier::Persistent, "k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn move_within_same_physical_layer_is_noop() {
        let mut store = TieredStore::new();
        store.put(Tier::Persistent, "k", "v").unwrap();
        let before = store.layer_contents(Tier::Persistent).to_string();
        assert!(store.move_frame("k", Tier::Persistent, Tier::Archived).unwrap());
        assert_eq!(store.layer_contents(Tier::Persistent), before);
    }

    #[test]
    fn move_of_missing_frame_is_false() {
        let mut store = TieredStore::new();
        assert!(!store.move_frame("absent", Tier::Working, Tier::Persistent).unwrap());
    }

    #[test]
    fn capacity_is_enforced_and_move_is_atomic() {
        let mut store = TieredStore::bounded(64);
        store.put(Tier::Working, "a", &"x".repeat(40)).unwrap();
        let err = store.put(Tier::Working, "b", &"y".repeat(40));
        assert!(matches!(err, Err(StoreError::OutOfCapacity { .. })));
        // The failed put left nothing behind.
        assert_eq!(store.get(Tier::Working, "b").unwrap(), None);
        assert_eq!(store.keys(Tier::Working), vec!["a"]);
    }

    #[test]
    fn replacing_a_frame_does_not_double_count_capacity() {
        let mut store = TieredStore::bounded(64);
        store.put(Tier::Working, "a", &"x".repeat(40)).unwrap();
        // Replacing in place stays within budget even though append+excise
        // would transiently exceed it.
        store.put(Tier::Working, "a", &"y".repeat(40)).unwrap();
        assert_eq!(store.get(Tier::Working, "a").unwrap().as_deref(), Some(&*"y".repeat(40)));
    }

    #[test]
    fn bodies_with_markup_like_content_survive() {
        let mut store = TieredStore::new();
        // Canonical JSON escapes '/' so "</key>" cannot appear in a body.
        let body = r#"{"html":"<div>x<\/div>"}"#;
        store.put(Tier::Working, "page", body).unwrap();
        assert_eq!(store.get(Tier::Working, "page").unwrap().as_deref(), Some(body));
    }
}
