//! Persistent file-backed KV store with WAL and checkpoint support.
//!
//! The live map is an in-memory BTreeMap. Every mutation is appended to a
//! write-ahead log before it is applied; a checkpoint writes the full map and
//! truncates the log. A write batch is one WAL record, so replay applies a
//! batch completely or not at all. A torn tail record left by a crash is
//! discarded on open.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::kvstore::{
    apply_batch, lock_poisoned, scan_prefix_in, scan_range_in, BatchOp, Key, KvPair, KvStore,
    Value,
};
use crate::types::{MetaError, MetaResult};

const WAL_FILENAME: &str = "wal.bin";
const CHECKPOINT_FILENAME: &str = "checkpoint.bin";

/// Number of WAL records after which a checkpoint is taken automatically.
pub const DEFAULT_CHECKPOINT_EVERY: u64 = 256;

#[derive(Debug, Serialize, Deserialize, Clone)]
enum WalOp {
    Put { key: Key, value: Value },
    Delete { key: Key },
}

impl From<BatchOp> for WalOp {
    fn from(op: BatchOp) -> Self {
        match op {
            BatchOp::Put { key, value } => WalOp::Put { key, value },
            BatchOp::Delete { key } => WalOp::Delete { key },
        }
    }
}

impl From<WalOp> for BatchOp {
    fn from(op: WalOp) -> Self {
        match op {
            WalOp::Put { key, value } => BatchOp::Put { key, value },
            WalOp::Delete { key } => BatchOp::Delete { key },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WalRecord {
    seq: u64,
    ops: Vec<WalOp>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    seq: u64,
    entries: Vec<KvPair>,
}

struct WalWriter {
    file: File,
    // Length of the durable, well-formed prefix of the log.
    len: u64,
    records_since_checkpoint: u64,
}

impl WalWriter {
    fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            records_since_checkpoint: 0,
        })
    }

    fn append(&mut self, record: &WalRecord) -> std::io::Result<()> {
        let encoded = bincode::serialize(record)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let mut frame = Vec::with_capacity(encoded.len() + 4);
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);

        // Anything past `len` is a partial frame from an earlier failed append.
        // Replay would stop there and drop every record written after it.
        if self.file.metadata()?.len() != self.len {
            tracing::warn!(valid_len = self.len, "trimming partial WAL frame before append");
            self.file.set_len(self.len)?;
        }
        if let Err(e) = self.write_frame(&frame) {
            if let Err(trim) = self.file.set_len(self.len) {
                tracing::error!(error = %trim, "failed to roll back partial WAL frame");
            }
            return Err(e);
        }
        self.len += frame.len() as u64;
        self.records_since_checkpoint += 1;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.file.write_all(frame)?;
        self.file.sync_all()
    }

    fn truncate(&mut self) -> std::io::Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.records_since_checkpoint = 0;
        Ok(())
    }
}

/// Durable KV store living in one directory (`wal.bin` + `checkpoint.bin`).
pub struct PersistentKvStore {
    data: Arc<RwLock<BTreeMap<Key, Value>>>,
    wal: Arc<Mutex<WalWriter>>,
    dir: PathBuf,
    seq: Arc<Mutex<u64>>,
    checkpoint_every: u64,
}

impl PersistentKvStore {
    /// Opens or creates a store in `dir`, loading the checkpoint and replaying the WAL.
    pub fn open(dir: &Path) -> MetaResult<Self> {
        Self::open_with_checkpoint_interval(dir, DEFAULT_CHECKPOINT_EVERY)
    }

    /// Like [`PersistentKvStore::open`] with a custom auto-checkpoint interval.
    /// An interval of 0 disables automatic checkpoints.
    pub fn open_with_checkpoint_interval(dir: &Path, checkpoint_every: u64) -> MetaResult<Self> {
        fs::create_dir_all(dir)?;

        let (mut data, mut seq) = load_checkpoint(&dir.join(CHECKPOINT_FILENAME))?;
        let wal_path = dir.join(WAL_FILENAME);
        let replay = replay_wal(&wal_path, &mut data, &mut seq)?;
        if replay.torn {
            let file = OpenOptions::new().write(true).open(&wal_path)?;
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        let replayed = replay.records;
        let wal = WalWriter::open(&wal_path)?;

        tracing::debug!(
            dir = %dir.display(),
            keys = data.len(),
            replayed,
            "opened persistent kv store"
        );

        Ok(Self {
            data: Arc::new(RwLock::new(data)),
            wal: Arc::new(Mutex::new(wal)),
            dir: dir.to_path_buf(),
            seq: Arc::new(Mutex::new(seq)),
            checkpoint_every,
        })
    }

    /// Directory holding the WAL and checkpoint files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes a full snapshot of the map and truncates the WAL.
    pub fn checkpoint(&self) -> MetaResult<()> {
        let mut wal = self.wal.lock().map_err(lock_poisoned)?;
        self.checkpoint_locked(&mut wal)
    }

    // Caller holds the WAL lock, so no record can land between the snapshot
    // and the truncate.
    fn checkpoint_locked(&self, wal: &mut WalWriter) -> MetaResult<()> {
        let seq = *self.seq.lock().map_err(lock_poisoned)?;
        let entries: Vec<KvPair> = {
            let data = self.data.read().map_err(lock_poisoned)?;
            data.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let encoded = bincode::serialize(&Checkpoint { seq, entries })
            .map_err(|e| MetaError::KvError(format!("failed to serialize checkpoint: {}", e)))?;

        let checkpoint_path = self.dir.join(CHECKPOINT_FILENAME);
        let tmp_path = checkpoint_path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&encoded)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &checkpoint_path)?;
        wal.truncate()?;

        tracing::debug!(seq, dir = %self.dir.display(), "kv checkpoint written");
        Ok(())
    }

    fn commit(&self, ops: Vec<BatchOp>) -> MetaResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut wal = self.wal.lock().map_err(lock_poisoned)?;
        // The WAL lock serializes commits; seq only advances once the record
        // is durable.
        let seq = *self.seq.lock().map_err(lock_poisoned)? + 1;
        let record = WalRecord {
            seq,
            ops: ops.iter().cloned().map(WalOp::from).collect(),
        };
        wal.append(&record)?;
        *self.seq.lock().map_err(lock_poisoned)? = seq;
        {
            let mut data = self.data.write().map_err(lock_poisoned)?;
            apply_batch(&mut data, ops);
        }
        if self.checkpoint_every > 0 && wal.records_since_checkpoint >= self.checkpoint_every {
            self.checkpoint_locked(&mut wal)?;
        }
        Ok(())
    }
}

fn load_checkpoint(path: &Path) -> MetaResult<(BTreeMap<Key, Value>, u64)> {
    let contents = match fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((BTreeMap::new(), 0)),
        Err(e) => return Err(e.into()),
    };
    if contents.is_empty() {
        return Ok((BTreeMap::new(), 0));
    }
    let checkpoint: Checkpoint = bincode::deserialize(&contents)
        .map_err(|e| MetaError::KvError(format!("failed to deserialize checkpoint: {}", e)))?;
    Ok((checkpoint.entries.into_iter().collect(), checkpoint.seq))
}

struct Replay {
    records: usize,
    valid_len: u64,
    torn: bool,
}

fn replay_wal(path: &Path, data: &mut BTreeMap<Key, Value>, seq: &mut u64) -> MetaResult<Replay> {
    let contents = match fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(Replay {
                records: 0,
                valid_len: 0,
                torn: false,
            })
        }
        Err(e) => return Err(e.into()),
    };

    let mut replay = Replay {
        records: 0,
        valid_len: 0,
        torn: false,
    };
    let mut offset = 0usize;
    while offset < contents.len() {
        let Some(len_bytes) = contents.get(offset..offset + 4) else {
            replay.torn = true;
            break;
        };
        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(len_bytes);
        let body_start = offset + 4;
        let body_end = body_start + u32::from_le_bytes(len_buf) as usize;
        let Some(body) = contents.get(body_start..body_end) else {
            replay.torn = true;
            break;
        };
        let record: WalRecord = match bincode::deserialize(body) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "undecodable WAL record");
                replay.torn = true;
                break;
            }
        };
        offset = body_end;
        replay.valid_len = offset as u64;
        // Records at or below the checkpoint seq are already in the map.
        if record.seq <= *seq {
            continue;
        }
        *seq = record.seq;
        apply_batch(data, record.ops.into_iter().map(BatchOp::from).collect());
        replay.records += 1;
    }
    if replay.torn {
        tracing::warn!(
            path = %path.display(),
            valid_len = replay.valid_len,
            "discarding torn WAL tail"
        );
    }
    Ok(replay)
}

impl KvStore for PersistentKvStore {
    fn get(&self, key: &[u8]) -> MetaResult<Option<Value>> {
        let data = self.data.read().map_err(lock_poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: Key, value: Value) -> MetaResult<()> {
        self.commit(vec![BatchOp::Put { key, value }])
    }

    fn delete(&self, key: &[u8]) -> MetaResult<()> {
        self.commit(vec![BatchOp::Delete { key: key.to_vec() }])
    }

    fn scan_prefix(&self, prefix: &[u8]) -> MetaResult<Vec<KvPair>> {
        let data = self.data.read().map_err(lock_poisoned)?;
        Ok(scan_prefix_in(&data, prefix))
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> MetaResult<Vec<KvPair>> {
        let data = self.data.read().map_err(lock_poisoned)?;
        Ok(scan_range_in(&data, start, end))
    }

    fn contains_key(&self, key: &[u8]) -> MetaResult<bool> {
        let data = self.data.read().map_err(lock_poisoned)?;
        Ok(data.contains_key(key))
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> MetaResult<()> {
        self.commit(ops)
    }
}
