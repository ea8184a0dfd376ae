//! File-backed respawn store
//!
//! One file per instance under the store directory. Every write rewrites the
//! instance's file through a temp file and an atomic rename, so a crash
//! leaves either the old or the new table on disk, never a torn one.
//!
//! Layout (little endian):
//! magic `HRSP` | version u32 | crc32 u32 | saved_at i64 | payload_len u64 | payload
//! where payload is the bincode encoding of `Vec<RespawnRecord>`.

use super::{PersistenceError, PersistenceResult, RespawnStore};
use crate::constants::storage::{RESPAWN_FILE_EXTENSION, RESPAWN_FILE_MAGIC, RESPAWN_FILE_VERSION};
use crate::entity::SpawnCategory;
use crate::respawn::RespawnRecord;
use crc32fast::Hasher;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 8;

type InstanceTable = BTreeMap<(SpawnCategory, u64), RespawnRecord>;

#[derive(Debug)]
pub struct FileRespawnStore {
    root: PathBuf,
    tables: FxHashMap<u32, InstanceTable>,
}

impl FileRespawnStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> PersistenceResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        log::info!("[FileRespawnStore] Opened respawn store at {}", root.display());
        Ok(Self {
            root,
            tables: FxHashMap::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn instance_path(&self, instance_id: u32) -> PathBuf {
        self.root
            .join(format!("respawns_{}.{}", instance_id, RESPAWN_FILE_EXTENSION))
    }

    fn table(&mut self, instance_id: u32) -> PersistenceResult<&mut InstanceTable> {
        if !self.tables.contains_key(&instance_id) {
            let records = read_table(&self.instance_path(instance_id))?;
            let table = records
                .into_iter()
                .map(|r| ((r.category, r.spawn_id), r))
                .collect();
            self.tables.insert(instance_id, table);
        }
        self.tables
            .get_mut(&instance_id)
            .ok_or_else(|| PersistenceError::CorruptedData("table cache miss".to_string()))
    }

    /// Write `table` to disk and only then make it the cached table, so the
    /// cache never runs ahead of the file
    fn commit(&mut self, instance_id: u32, table: InstanceTable) -> PersistenceResult<()> {
        let records: Vec<RespawnRecord> = table.values().cloned().collect();
        write_table_atomic(&self.instance_path(instance_id), &records)?;
        self.tables.insert(instance_id, table);
        Ok(())
    }
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

fn encode_table(records: &[RespawnRecord]) -> PersistenceResult<Vec<u8>> {
    let payload = bincode::serialize(records)
        .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&RESPAWN_FILE_MAGIC);
    bytes.extend_from_slice(&RESPAWN_FILE_VERSION.to_le_bytes());
    bytes.extend_from_slice(&crc32(&payload).to_le_bytes());
    bytes.extend_from_slice(&chrono::Utc::now().timestamp().to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn decode_table(bytes: &[u8]) -> PersistenceResult<Vec<RespawnRecord>> {
    if bytes.len() < HEADER_LEN {
        return Err(PersistenceError::CorruptedData(format!(
            "respawn file too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[0..4] != RESPAWN_FILE_MAGIC {
        return Err(PersistenceError::CorruptedData(
            "bad respawn file magic".to_string(),
        ));
    }

    let read_u32 = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let version = read_u32(4);
    if version != RESPAWN_FILE_VERSION {
        return Err(PersistenceError::VersionMismatch {
            expected: RESPAWN_FILE_VERSION,
            found: version,
        });
    }
    let checksum = read_u32(8);

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[20..28]);
    let payload = usize::try_from(u64::from_le_bytes(len_bytes))
        .ok()
        .and_then(|len| HEADER_LEN.checked_add(len))
        .and_then(|end| bytes.get(HEADER_LEN..end))
        .ok_or_else(|| PersistenceError::CorruptedData("truncated respawn payload".to_string()))?;

    if crc32(payload) != checksum {
        return Err(PersistenceError::CorruptedData(
            "respawn file checksum mismatch".to_string(),
        ));
    }

    bincode::deserialize(payload).map_err(|e| PersistenceError::DeserializationError(e.to_string()))
}

fn read_table(path: &Path) -> PersistenceResult<Vec<RespawnRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = fs::read(path)?;
    decode_table(&bytes)
}

fn write_table_atomic(path: &Path, records: &[RespawnRecord]) -> PersistenceResult<()> {
    let bytes = encode_table(records)?;
    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| PersistenceError::SaveFailed(e.to_string()))?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

impl RespawnStore for FileRespawnStore {
    fn save_respawn(&mut self, instance_id: u32, record: &RespawnRecord) -> PersistenceResult<()> {
        let mut table = self.table(instance_id)?.clone();
        table.insert((record.category, record.spawn_id), record.clone());
        self.commit(instance_id, table)
    }

    fn delete_respawn(
        &mut self,
        instance_id: u32,
        category: SpawnCategory,
        spawn_id: u64,
    ) -> PersistenceResult<()> {
        let current = self.table(instance_id)?;
        if !current.contains_key(&(category, spawn_id)) {
            return Ok(());
        }
        let mut table = current.clone();
        table.remove(&(category, spawn_id));
        self.commit(instance_id, table)
    }

    fn load_all_respawns(&mut self, instance_id: u32) -> PersistenceResult<Vec<RespawnRecord>> {
        Ok(self.table(instance_id)?.values().cloned().collect())
    }

    fn delete_all_respawns(&mut self, instance_id: u32) -> PersistenceResult<()> {
        let path = self.instance_path(instance_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        self.tables.insert(instance_id, InstanceTable::new());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(spawn_id: u64, due_time: i64) -> RespawnRecord {
        RespawnRecord {
            category: SpawnCategory::Creature,
            spawn_id,
            template_id: 300,
            due_time,
            cell_id: 17,
        }
    }

    #[test]
    fn test_rows_survive_reopen() {
        let dir = TempDir::new().expect("temp dir");
        {
            let mut store = FileRespawnStore::open(dir.path()).expect("open");
            store.save_respawn(4, &record(1, 1000)).expect("save");
            store.save_respawn(4, &record(2, 2000)).expect("save");
            store.delete_respawn(4, SpawnCategory::Creature, 1).expect("delete");
        }

        let mut reopened = FileRespawnStore::open(dir.path()).expect("reopen");
        let rows = reopened.load_all_respawns(4).expect("load");
        assert_eq!(rows, vec![record(2, 2000)]);
        assert!(reopened.load_all_respawns(5).expect("load other").is_empty());
    }

    #[test]
    fn test_corruption_is_detected() {
        let dir = TempDir::new().expect("temp dir");
        let path = {
            let mut store = FileRespawnStore::open(dir.path()).expect("open");
            store.save_respawn(1, &record(9, 10)).expect("save");
            store.instance_path(1)
        };

        let mut bytes = fs::read(&path).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).expect("write");

        let mut store = FileRespawnStore::open(dir.path()).expect("open");
        assert!(matches!(
            store.load_all_respawns(1),
            Err(PersistenceError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileRespawnStore::open(dir.path()).expect("open");
        let path = store.instance_path(2);

        let mut bytes = encode_table(&[record(1, 1)]).expect("encode");
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        fs::write(&path, &bytes).expect("write");

        let mut store = FileRespawnStore::open(dir.path()).expect("open");
        assert!(matches!(
            store.load_all_respawns(2),
            Err(PersistenceError::VersionMismatch { found: 99, .. })
        ));
    }

    /// A directory squatting on the temp path makes the next rewrite fail
    fn block_writes(store: &FileRespawnStore, instance_id: u32) -> PathBuf {
        let tmp = store.instance_path(instance_id).with_extension("tmp");
        fs::create_dir(&tmp).expect("block temp path");
        tmp
    }

    #[test]
    fn test_failed_delete_keeps_row_until_retried() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FileRespawnStore::open(dir.path()).expect("open");
        store.save_respawn(1, &record(6, 1090)).expect("save");

        let blocker = block_writes(&store, 1);
        assert!(store.delete_respawn(1, SpawnCategory::Creature, 6).is_err());
        // Cache and disk still agree on the row
        assert_eq!(store.load_all_respawns(1).expect("load"), vec![record(6, 1090)]);

        fs::remove_dir(&blocker).expect("unblock");
        store.delete_respawn(1, SpawnCategory::Creature, 6).expect("retry delete");

        let mut reopened = FileRespawnStore::open(dir.path()).expect("reopen");
        assert!(reopened.load_all_respawns(1).expect("load").is_empty());
    }

    #[test]
    fn test_failed_save_is_not_cached() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FileRespawnStore::open(dir.path()).expect("open");
        store.save_respawn(2, &record(1, 10)).expect("save");

        let blocker = block_writes(&store, 2);
        assert!(store.save_respawn(2, &record(1, 99)).is_err());
        assert_eq!(store.load_all_respawns(2).expect("load"), vec![record(1, 10)]);
        fs::remove_dir(&blocker).expect("unblock");
    }

    #[test]
    fn test_oversized_payload_length_is_corruption() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileRespawnStore::open(dir.path()).expect("open");
        let path = store.instance_path(7);

        let mut bytes = encode_table(&[record(1, 1)]).expect("encode");
        bytes[20..28].copy_from_slice(&u64::MAX.to_le_bytes());
        fs::write(&path, &bytes).expect("write");

        let mut store = FileRespawnStore::open(dir.path()).expect("open");
        assert!(matches!(
            store.load_all_respawns(7),
            Err(PersistenceError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_delete_all_removes_file() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FileRespawnStore::open(dir.path()).expect("open");
        store.save_respawn(3, &record(1, 1)).expect("save");
        assert!(store.instance_path(3).exists());

        store.delete_all_respawns(3).expect("delete all");
        assert!(!store.instance_path(3).exists());
        assert!(store.load_all_respawns(3).expect("load").is_empty());
    }
}
