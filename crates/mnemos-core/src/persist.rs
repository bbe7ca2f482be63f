//! Durable state: tolerant loading and a background save queue.
//!
//! Saves never block the caller. Each mutation enqueues a serialized snapshot;
//! one writer task writes it atomically (temp file in the same directory, then
//! rename). Failures are logged and counted, never returned. The in-memory
//! copy stays authoritative.
//!
//! Persistence is last-writer-wins and assumes a single writer process.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{MemoryError, MemoryResult};
use crate::memory::{
    ActivationEntry, ActivationIndex, StmBuffer, StmEntry, ACTIVATION_INDEX_VERSION,
    STM_BUFFER_VERSION,
};
use crate::metrics::METRICS;
use crate::obs;

/// Write `bytes` to `path` atomically, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> MemoryResult<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a JSON state file. `Ok(None)` when it does not exist; unparseable
/// files are moved aside and treated as missing.
fn read_json(path: &Path) -> MemoryResult<Option<Value>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(Some(Value::Object(map))),
        Ok(_) | Err(_) => {
            quarantine(path);
            Ok(None)
        }
    }
}

fn quarantine(path: &Path) {
    let aside = path.with_extension(format!("corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")));
    match fs::rename(path, &aside) {
        Ok(()) => warn!(
            path = %path.display(),
            moved_to = %aside.display(),
            "state file unreadable, moved aside"
        ),
        Err(e) => warn!(
            path = %path.display(),
            error = %e,
            "state file unreadable and could not be moved"
        ),
    }
}

fn check_version(path: &Path, value: &Value, expected: u32) {
    let found = value.get("version").and_then(Value::as_u64);
    if found != Some(u64::from(expected)) {
        warn!(
            path = %path.display(),
            ?found,
            expected,
            "unexpected state version, loading leniently"
        );
    }
}

/// Load the activation index. Malformed entries are skipped.
pub fn load_index(path: &Path) -> MemoryResult<ActivationIndex> {
    let mut index = ActivationIndex::new();
    let Some(value) = read_json(path)? else {
        return Ok(index);
    };
    check_version(path, &value, ACTIVATION_INDEX_VERSION);

    let Some(entries) = value.get("entries").and_then(Value::as_object) else {
        warn!(path = %path.display(), "activation index has no entries map");
        return Ok(index);
    };
    let mut skipped = 0usize;
    for (id, raw) in entries {
        let mut raw = raw.clone();
        if let Some(obj) = raw.as_object_mut() {
            obj.entry("memoryId").or_insert_with(|| Value::String(id.clone()));
        }
        match serde_json::from_value::<ActivationEntry>(raw) {
            Ok(mut entry) => {
                entry.memory_id = id.clone();
                index.insert(entry);
            }
            Err(e) => {
                skipped += 1;
                debug!(memory_id = %id, error = %e, "skipping malformed activation entry");
            }
        }
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "dropped malformed activation entries");
    }
    Ok(index)
}

/// Load the STM buffer. Malformed entries are skipped.
pub fn load_stm(path: &Path) -> MemoryResult<StmBuffer> {
    let mut buffer = StmBuffer::new();
    let Some(value) = read_json(path)? else {
        return Ok(buffer);
    };
    check_version(path, &value, STM_BUFFER_VERSION);

    let counter = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_u64)
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0)
    };
    let timestamp = |key: &str| {
        value
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok())
    };
    buffer.turns_since_consolidation = counter("turnsSinceConsolidation");
    buffer.turns_since_reflection = counter("turnsSinceReflection");
    buffer.last_consolidated_at = timestamp("lastConsolidatedAt");
    buffer.last_reflected_at = timestamp("lastReflectedAt");

    let raw_entries = value
        .get("entries")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let total = raw_entries.len();
    buffer.entries = raw_entries
        .into_iter()
        .filter_map(|v| serde_json::from_value::<StmEntry>(v).ok())
        .collect();
    if buffer.entries.len() < total {
        warn!(
            path = %path.display(),
            skipped = total - buffer.entries.len(),
            "dropped malformed stm entries"
        );
    }
    Ok(buffer)
}

#[derive(Debug)]
enum SaveJob {
    Write { path: PathBuf, bytes: Vec<u8> },
    Flush(oneshot::Sender<()>),
}

/// Handle to the background writer task.
#[derive(Debug, Clone)]
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<SaveJob>,
}

impl SaveQueue {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SaveJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    SaveJob::Write { path, bytes } => {
                        let target = path.clone();
                        let result =
                            tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
                                .await
                                .map_err(|e| MemoryError::Persistence(e.to_string()))
                                .and_then(|r| r);
                        match result {
                            Ok(()) => debug!(path = %target.display(), "state saved"),
                            Err(e) => {
                                obs::emit_persist_failed(&target.display().to_string(), &e);
                                METRICS.inc_persist_failures();
                            }
                        }
                    }
                    SaveJob::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    /// Serialize `state` now and queue the write.
    pub fn save<T: Serialize>(&self, path: &Path, state: &T) {
        let bytes = match serde_json::to_vec_pretty(state) {
            Ok(b) => b,
            Err(e) => {
                obs::emit_persist_failed(&path.display().to_string(), &e);
                METRICS.inc_persist_failures();
                return;
            }
        };
        let job = SaveJob::Write {
            path: path.to_path_buf(),
            bytes,
        };
        if self.tx.send(job).is_err() {
            warn!(path = %path.display(), "save queue closed, state not persisted");
            METRICS.inc_persist_failures();
        }
    }

    /// Wait until every write queued before this call has finished.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(SaveJob::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryType;

    #[test]
    fn test_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_index(&dir.path().join("none.json")).unwrap().is_empty());
        assert!(load_stm(&dir.path().join("none.json")).unwrap().entries.is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        fs::write(
            &path,
            r#"{"version":1,"entries":{
                "good":{"memoryType":"semantic","createdAt":"2024-01-01T00:00:00Z","lastAccessedAt":"2024-01-02T00:00:00Z","accessCount":2},
                "bad":{"memoryType":"nonsense"},
                "worse":17
            }}"#,
        )
        .unwrap();
        let index = load_index(&path).unwrap();
        assert_eq!(index.len(), 1);
        let good = index.get("good").unwrap();
        assert_eq!(good.memory_id, "good");
        assert_eq!(good.access_count, 2);
        assert!(!good.pinned);
    }

    #[test]
    fn test_garbage_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stm.json");
        fs::write(&path, "not json at all").unwrap();
        let stm = load_stm(&path).unwrap();
        assert!(stm.entries.is_empty());
        assert!(!path.exists());
        let moved = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(moved, 1);
    }

    #[test]
    fn test_non_utf8_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x81]).unwrap();
        let index = load_index(&path).unwrap();
        assert!(index.is_empty());
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_stm_counters_and_bad_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stm.json");
        fs::write(
            &path,
            r#"{"version":1,"turnsSinceConsolidation":4,"turnsSinceReflection":"x",
                "entries":[{"id":"a","timestamp":"2024-01-01T00:00:00Z","userExcerpts":["hi"]},{"id":5}]}"#,
        )
        .unwrap();
        let stm = load_stm(&path).unwrap();
        assert_eq!(stm.turns_since_consolidation, 4);
        assert_eq!(stm.turns_since_reflection, 0);
        assert_eq!(stm.entries.len(), 1);
        assert!(!stm.entries[0].consolidated);
    }

    #[tokio::test]
    async fn test_save_queue_roundtrip_and_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        let mut index = ActivationIndex::new();
        index.record_access("m1", Some(MemoryType::Procedural), Utc::now());

        let queue = SaveQueue::spawn();
        queue.save(&path, &index);
        queue.flush().await;

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded, index);
    }
}
