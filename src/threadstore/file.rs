//! File-backed threadstore.
//!
//! The whole index is kept in memory and rewritten on every mutation as a
//! MessagePack snapshot behind a magic/version header. A sibling lock file
//! keeps a second process from opening the same store.

use super::index::ThreadIndex;
use super::Threadstore;
use crate::error::{Result, ServiceError};
use crate::types::{Cid, LogId, LogInfo, PeerAddr, ThreadId, ThreadInfo};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for threadstore files.
const THREADSTORE_MAGIC: &[u8; 4] = b"TST\0";

/// Current threadstore format version.
const THREADSTORE_VERSION: u8 = 1;

/// Threadstore persisted to a single file.
pub struct FileThreadstore {
    /// Path to the snapshot file.
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// In-memory index.
    index: RwLock<ThreadIndex>,
}

impl FileThreadstore {
    /// Open the store at `path`, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = Self::acquire_lock(&path)?;

        let index = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            ThreadIndex::default()
        };

        Ok(Self {
            path,
            _lock_file: lock_file,
            index: RwLock::new(index),
        })
    }

    /// Apply a mutation and persist the result before publishing it.
    fn mutate<T>(&self, f: impl FnOnce(&mut ThreadIndex) -> Result<T>) -> Result<T> {
        let mut index = self.index.write();
        let mut next = index.clone();
        let out = f(&mut next)?;
        self.save(&next)?;
        *index = next;
        Ok(out)
    }

    fn save(&self, index: &ThreadIndex) -> Result<()> {
        let encoded = rmp_serde::to_vec(index)
            .map_err(|e| ServiceError::Serialization(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;

            file.write_all(THREADSTORE_MAGIC)?;
            file.write_all(&[THREADSTORE_VERSION])?;
            file.write_all(&(encoded.len() as u64).to_le_bytes())?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn load_from_file(path: &Path) -> Result<ThreadIndex> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != THREADSTORE_MAGIC {
            return Err(ServiceError::InvalidFormat(
                "Invalid threadstore magic".into(),
            ));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != THREADSTORE_VERSION {
            return Err(ServiceError::InvalidFormat(format!(
                "Unsupported threadstore version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut encoded = vec![0u8; len];
        file.read_exact(&mut encoded)?;

        rmp_serde::from_slice(&encoded).map_err(|e| ServiceError::Deserialization(e.to_string()))
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.with_extension("lock"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| ServiceError::Locked)?;

        Ok(lock_file)
    }
}

impl Threadstore for FileThreadstore {
    fn add_thread(&self, id: &ThreadId) -> Result<()> {
        self.mutate(|index| index.add_thread(id))
    }

    fn has_thread(&self, id: &ThreadId) -> Result<bool> {
        Ok(self.index.read().has_thread(id))
    }

    fn thread_info(&self, id: &ThreadId) -> Result<Option<ThreadInfo>> {
        Ok(self.index.read().thread_info(id))
    }

    fn threads(&self) -> Result<Vec<ThreadId>> {
        Ok(self.index.read().threads())
    }

    fn delete_thread(&self, id: &ThreadId) -> Result<bool> {
        if !self.index.read().has_thread(id) {
            return Ok(false);
        }
        self.mutate(|index| Ok(index.delete_thread(id)))
    }

    fn add_log(&self, thread: &ThreadId, info: LogInfo) -> Result<bool> {
        self.mutate(|index| index.add_log(thread, info))
    }

    fn log_info(&self, thread: &ThreadId, log: &LogId) -> Result<Option<LogInfo>> {
        Ok(self.index.read().log_info(thread, log))
    }

    fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>> {
        self.index.read().logs(thread)
    }

    fn add_addrs(&self, thread: &ThreadId, log: &LogId, addrs: &[PeerAddr]) -> Result<()> {
        self.mutate(|index| index.add_addrs(thread, log, addrs))
    }

    fn compare_and_set_head(
        &self,
        thread: &ThreadId,
        log: &LogId,
        expected: Option<&Cid>,
        new: &Cid,
    ) -> Result<bool> {
        let mut index = self.index.write();
        let mut next = index.clone();
        if !next.compare_and_set_head(thread, log, expected, new)? {
            return Ok(false);
        }
        self.save(&next)?;
        *index = next;
        Ok(true)
    }
}
