//! On-disk persistence for the two memory files.
//!
//! The memory file is a JSON object holding both store layers verbatim:
//!
//! ```text
//! { "working_memory": <string>, "disk_memory": <string> }
//! ```
//!
//! The directory file is a JSON array of directory entries using the
//! on-disk field names (`layer`, `importance_score`, `last_accessed`,
//! `data_size`).
//!
//! Writes go through write-to-temp + rename, rotating the previous file to
//! a `.backup` sibling first; loads fall back to the backup when the
//! primary is corrupt. A sibling `.lock` file serializes access across
//! agent processes for the duration of a step.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pagemind_core::error::PersistenceError;
use pagemind_core::memory::{DirectoryEntry, Tier};

use crate::tiered::TieredMemory;

/// The memory-file record. Both fields are opaque to this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFile {
    pub working_memory: String,
    pub disk_memory: String,
}

fn io_error(path: &Path, err: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".backup");
    PathBuf::from(os)
}

/// Write `contents` atomically: temp file in the same directory, rotate the
/// previous file to `.backup`, rename into place.
pub fn atomic_write(path: &Path, contents: &str) -> Result<(), PersistenceError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(path, e))?;
    temp.write_all(contents.as_bytes()).map_err(|e| io_error(path, e))?;
    temp.flush().map_err(|e| io_error(path, e))?;

    if path.exists() {
        std::fs::rename(path, backup_path(path)).map_err(|e| io_error(path, e))?;
    }
    temp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

/// Read and parse a JSON file, falling back to its `.backup` sibling when
/// the primary is corrupt. Returns `Ok(None)` when neither file exists.
fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let primary = match std::fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(io_error(path, e)),
    };

    if let Some(contents) = primary {
        match serde_json::from_str(&contents) {
            Ok(value) => return Ok(Some(value)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Primary file corrupt, trying backup");
                let backup = backup_path(path);
                let backup_contents =
                    std::fs::read_to_string(&backup).map_err(|_| PersistenceError::Corrupt {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                let value = serde_json::from_str(&backup_contents).map_err(|_| {
                    PersistenceError::Corrupt {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

/// Exclusive inter-process lock held for the duration of a step.
///
/// Backed by a `.lock` sibling created with `create_new`; dropping the
/// guard removes it.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn acquire(path: &Path) -> Result<Self, PersistenceError> {
        let lock_path = {
            let mut os = path.as_os_str().to_os_string();
            os.push(".lock");
            PathBuf::from(os)
        };
        if let Some(dir) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        }
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                Ok(Self { path: lock_path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(PersistenceError::AlreadyLocked {
                    path: lock_path.display().to_string(),
                })
            }
            Err(e) => Err(io_error(&lock_path, e)),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release file lock");
        }
    }
}

/// Loads and saves one agent's memory and directory files.
#[derive(Debug, Clone)]
pub struct MemoryFiles {
    memory_path: PathBuf,
    directory_path: PathBuf,
}

impl MemoryFiles {
    pub fn new(memory_path: impl Into<PathBuf>, directory_path: impl Into<PathBuf>) -> Self {
        Self {
            memory_path: memory_path.into(),
            directory_path: directory_path.into(),
        }
    }

    pub fn memory_path(&self) -> &Path {
        &self.memory_path
    }

    /// Lock the memory file for a step.
    pub fn lock(&self) -> Result<FileLock, PersistenceError> {
        FileLock::acquire(&self.memory_path)
    }

    /// Persist both files.
    pub fn save(&self, memory: &TieredMemory) -> Result<(), PersistenceError> {
        let record = MemoryFile {
            working_memory: memory.store().layer_contents(Tier::Working).to_string(),
            disk_memory: memory.store().layer_contents(Tier::Persistent).to_string(),
        };
        let memory_json =
            serde_json::to_string(&record).map_err(|e| PersistenceError::Io {
                path: self.memory_path.display().to_string(),
                reason: e.to_string(),
            })?;
        atomic_write(&self.memory_path, &memory_json)?;

        let entries: Vec<&DirectoryEntry> = memory.directory().iter().collect();
        let directory_json =
            serde_json::to_string(&entries).map_err(|e| PersistenceError::Io {
                path: self.directory_path.display().to_string(),
                reason: e.to_string(),
            })?;
        atomic_write(&self.directory_path, &directory_json)?;

        debug!(
            memory = %self.memory_path.display(),
            directory = %self.directory_path.display(),
            "Persisted memory files"
        );
        Ok(())
    }

    /// Load both files into a fresh state. Missing files yield empty
    /// memory; corrupt files fall back to their backups.
    pub fn load(&self, memory: &mut TieredMemory) -> Result<(), PersistenceError> {
        let record: Option<MemoryFile> = load_json(&self.memory_path)?;
        let entries: Option<Vec<DirectoryEntry>> = load_json(&self.directory_path)?;

        let record = record.unwrap_or(MemoryFile {
            working_memory: String::new(),
            disk_memory: String::new(),
        });
        memory.load(
            record.working_memory,
            record.disk_memory,
            entries.unwrap_or_default(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_paths() -> (tempfile::TempDir, MemoryFiles) {
        let dir = tempfile::tempdir().unwrap();
        let files = MemoryFiles::new(
            dir.path().join("memory.json"),
            dir.path().join("directory.json"),
        );
        (dir, files)
    }

    fn seeded() -> TieredMemory {
        let mut memory = TieredMemory::new();
        memory.insert(Tier::Working, "wm_key", r#"{"a":1}"#, 50, 100).unwrap();
        memory.insert(Tier::Persistent, "st_key", r#""hello""#, 80, 200).unwrap();
        memory
    }

    #[test]
    fn save_then_load_roundtrips() {
        let (_dir, files) = temp_paths();
        let memory = seeded();
        files.save(&memory).unwrap();

        let mut restored = TieredMemory::new();
        files.load(&mut restored).unwrap();

        assert_eq!(
            restored.store().get(Tier::Working, "wm_key").unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
        assert_eq!(restored.directory().find("st_key").unwrap().importance, 80);
        assert!(restored.verify().is_clean());
    }

    #[test]
    fn memory_file_shape_is_pinned() {
        let (_dir, files) = temp_paths();
        files.save(&seeded()).unwrap();

        let raw = std::fs::read_to_string(files.memory_path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(parsed["working_memory"].as_str().unwrap().contains("<key:wm_key>"));
        assert!(parsed["disk_memory"].as_str().unwrap().contains("<key:st_key>"));
    }

    #[test]
    fn directory_file_uses_layer_codes() {
        let (dir, files) = temp_paths();
        files.save(&seeded()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("directory.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["layer"], 0);
        assert_eq!(parsed[1]["layer"], 1);
        assert_eq!(parsed[1]["importance_score"], 80);
    }

    #[test]
    fn missing_files_load_empty() {
        let (_dir, files) = temp_paths();
        let mut memory = TieredMemory::new();
        files.load(&mut memory).unwrap();
        assert_eq!(memory.directory().total_count(), 0);
    }

    #[test]
    fn corrupt_primary_recovers_from_backup() {
        let (_dir, files) = temp_paths();
        files.save(&seeded()).unwrap();
        // Second save rotates the good file into .backup.
        files.save(&seeded()).unwrap();

        std::fs::write(files.memory_path(), "{not json").unwrap();

        let mut restored = TieredMemory::new();
        files.load(&mut restored).unwrap();
        assert!(
            restored
                .store()
                .get(Tier::Working, "wm_key")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn corrupt_primary_without_backup_is_an_error() {
        let (_dir, files) = temp_paths();
        std::fs::write(files.memory_path(), "{not json").unwrap();
        let mut memory = TieredMemory::new();
        assert!(matches!(
            files.load(&mut memory),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let (_dir, files) = temp_paths();
        let lock = files.lock().unwrap();
        assert!(matches!(
            files.lock(),
            Err(PersistenceError::AlreadyLocked { .. })
        ));
        drop(lock);
        assert!(files.lock().is_ok());
    }

    #[test]
    fn atomic_write_rotates_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.json");
        atomic_write(&path, "one").unwrap();
        atomic_write(&path, "two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.json.backup")).unwrap(),
            "one"
        );
    }
}
