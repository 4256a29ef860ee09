// src/storage.rs
// RocksDB-backed persistent storage and the block-scoped state view

use crate::error::{Result, WeightError};
use rocksdb::{Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

/// Type alias for RocksDB (Arc for cheap cloning)
pub type RocksDb = Arc<DB>;

/// Open RocksDB with retry/backoff.
/// A locked or briefly unavailable directory is retried before giving up.
pub fn try_open_db<P: AsRef<Path>>(path: P) -> Result<RocksDb> {
    let path = path.as_ref();
    let mut attempt = 0u32;
    let max_attempts = 8u32;
    let mut wait = 250u64;

    loop {
        match open_rocksdb_internal(path) {
            Ok(db) => return Ok(Arc::new(db)),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(WeightError::Db(format!(
                        "Failed to open RocksDB at '{}' after {} attempts: {}",
                        path.display(),
                        attempt,
                        e
                    )));
                }
                log::warn!(
                    "open_db attempt {}/{} failed: {} - retrying in {}ms",
                    attempt,
                    max_attempts,
                    e,
                    wait
                );
                sleep(Duration::from_millis(wait));
                wait = std::cmp::min(wait * 2, 2000);
            }
        }
    }
}

fn open_rocksdb_internal(path: &Path) -> std::result::Result<DB, rocksdb::Error> {
    let mut opts = Options::default();
    opts.create_if_missing(true);

    let num_cpus = num_cpus::get() as i32;
    opts.increase_parallelism(num_cpus);
    opts.set_max_background_jobs(4);
    opts.set_max_open_files(512);
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

    DB::open(&opts, path)
}

/// Iterate committed (key, value) pairs whose keys start with the given prefix.
pub fn iter_prefix_raw(db: &RocksDb, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut out = Vec::new();
    for item in db.prefix_iterator(prefix) {
        let (k, v) = item?;
        if !k.starts_with(prefix) {
            break;
        }
        out.push((k.to_vec(), v.to_vec()));
    }
    Ok(out)
}

/// State-transition view for one block.
///
/// Reads see the committed DB overlaid with this block's pending writes.
/// Nothing reaches disk until [`BlockContext::commit`], which applies every
/// pending write in one `WriteBatch`; dropping the context discards them.
pub struct BlockContext {
    db: RocksDb,
    height: i64,
    chain_id: String,
    /// key -> Some(value) for puts, None for deletes
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl BlockContext {
    pub fn new(db: RocksDb, height: i64, chain_id: impl Into<String>) -> Self {
        Self {
            db,
            height,
            chain_id: chain_id.into(),
            pending: BTreeMap::new(),
        }
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.pending.get(key) {
            return Ok(entry.clone());
        }
        Ok(self.db.get(key)?)
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.pending.insert(key, None);
    }

    /// Get and deserialize a JSON value.
    pub fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize a value as JSON and stage it.
    pub fn put_json<V: Serialize>(&mut self, key: Vec<u8>, val: &V) -> Result<()> {
        let bytes = serde_json::to_vec(val)?;
        self.put(key, bytes);
        Ok(())
    }

    /// All live entries under `prefix`, committed state merged with pending writes.
    pub fn iter_prefix(&self, prefix: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            iter_prefix_raw(&self.db, prefix)?.into_iter().collect();

        for (k, v) in self.pending.range(prefix.to_vec()..) {
            if !k.starts_with(prefix) {
                break;
            }
            match v {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        Ok(merged)
    }

    /// Number of staged writes.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Apply all staged writes atomically.
    pub fn commit(self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for (k, v) in &self.pending {
            match v {
                Some(v) => batch.put(k, v),
                None => batch.delete(k),
            }
        }
        self.db.write(batch)?;
        log::debug!(
            "committed {} writes for height {}",
            self.pending.len(),
            self.height
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pending_writes_are_visible_before_commit() {
        let dir = tempdir().unwrap();
        let db = try_open_db(dir.path()).unwrap();

        let mut ctx = BlockContext::new(db.clone(), 5, "test-chain");
        ctx.put(b"k:1".to_vec(), b"one".to_vec());

        assert_eq!(ctx.get(b"k:1").unwrap(), Some(b"one".to_vec()));
        assert!(db.get(b"k:1").unwrap().is_none());

        ctx.commit().unwrap();
        assert_eq!(db.get(b"k:1").unwrap(), Some(b"one".to_vec()));
    }

    #[test]
    fn test_dropped_context_discards_writes() {
        let dir = tempdir().unwrap();
        let db = try_open_db(dir.path()).unwrap();

        {
            let mut ctx = BlockContext::new(db.clone(), 1, "test-chain");
            ctx.put(b"k:1".to_vec(), b"one".to_vec());
        }

        let ctx = BlockContext::new(db, 2, "test-chain");
        assert!(ctx.get(b"k:1").unwrap().is_none());
    }

    #[test]
    fn test_iter_prefix_merges_overlay() {
        let dir = tempdir().unwrap();
        let db = try_open_db(dir.path()).unwrap();
        db.put(b"w:a", b"1").unwrap();
        db.put(b"w:b", b"2").unwrap();
        db.put(b"x:c", b"3").unwrap();

        let mut ctx = BlockContext::new(db, 1, "test-chain");
        ctx.put(b"w:b".to_vec(), b"20".to_vec());
        ctx.put(b"w:d".to_vec(), b"4".to_vec());
        ctx.delete(b"w:a".to_vec());

        let entries = ctx.iter_prefix(b"w:").unwrap();
        let keys: Vec<&[u8]> = entries.keys().map(|k| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"w:b"[..], &b"w:d"[..]]);
        assert_eq!(entries[&b"w:b".to_vec()], b"20".to_vec());
    }

    #[test]
    fn test_json_helpers() {
        let dir = tempdir().unwrap();
        let db = try_open_db(dir.path()).unwrap();

        let mut ctx = BlockContext::new(db, 1, "test-chain");
        ctx.put_json(b"n".to_vec(), &42i64).unwrap();
        assert_eq!(ctx.get_json::<i64>(b"n").unwrap(), Some(42));
        assert_eq!(ctx.get_json::<i64>(b"missing").unwrap(), None);
    }
}
