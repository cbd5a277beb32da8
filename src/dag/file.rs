//! On-disk block store.
//!
//! Blocks are stored by their hash, sharded into directories by the first
//! byte of the hash (like Git objects).

use super::{DagStore, Node};
use crate::error::{Result, ServiceError};
use crate::types::Cid;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Magic bytes for block files.
const BLOCK_MAGIC: &[u8; 4] = b"BLK\0";

/// Current block format version.
const BLOCK_VERSION: u8 = 1;

/// Content-addressed block storage on the local filesystem.
pub struct FileDagStore {
    /// Base directory for blocks.
    path: PathBuf,

    /// LRU cache for recently accessed blocks.
    cache: Mutex<LruCache<Cid, Vec<u8>>>,

    /// Suffix for temporary block files, unique per write.
    next_tmp: AtomicU64,
}

impl FileDagStore {
    /// Open (or create) block storage at the given path.
    pub fn new(path: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            path,
            cache: Mutex::new(LruCache::new(cache_size)),
            next_tmp: AtomicU64::new(0),
        })
    }

    fn read_block(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        let block_path = self.block_path(cid);
        if !block_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&block_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != BLOCK_MAGIC {
            return Err(ServiceError::InvalidFormat("Invalid block magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != BLOCK_VERSION {
            return Err(ServiceError::InvalidFormat(format!(
                "Unsupported block version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut data = vec![0u8; len];
        file.read_exact(&mut data)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&data);
        if stored_checksum != computed_checksum {
            return Err(ServiceError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        Ok(Some(data))
    }

    fn write_block(&self, cid: &Cid, data: &[u8]) -> Result<()> {
        fs::create_dir_all(self.shard_path(cid))?;

        // Each writer gets its own temporary file; only complete blocks are
        // renamed into place.
        let block_path = self.block_path(cid);
        let seq = self.next_tmp.fetch_add(1, Ordering::Relaxed);
        let tmp_path =
            block_path.with_extension(format!("tmp-{}-{seq}", std::process::id()));
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(BLOCK_MAGIC)?;
            file.write_all(&[BLOCK_VERSION])?;
            file.write_all(&(data.len() as u64).to_le_bytes())?;
            file.write_all(data)?;
            file.write_all(&crc32fast::hash(data).to_le_bytes())?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp_path, &block_path) {
            let _ = fs::remove_file(&tmp_path);
            // Lost a race with another writer of the same block
            if !block_path.exists() {
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn shard_path(&self, cid: &Cid) -> PathBuf {
        self.path.join(cid.shard_prefix())
    }

    fn block_path(&self, cid: &Cid) -> PathBuf {
        self.shard_path(cid).join(cid.to_hex())
    }
}

impl DagStore for FileDagStore {
    fn get(&self, cid: &Cid) -> Result<Option<Node>> {
        if let Some(cached) = self.cache.lock().get(cid).cloned() {
            return Ok(Some(Node::new(cached)));
        }

        let data = match self.read_block(cid)? {
            Some(data) => data,
            None => return Ok(None),
        };
        let node = Node::verified(*cid, data)?;

        self.cache.lock().put(*cid, node.data().to_vec());
        Ok(Some(node))
    }

    fn put(&self, node: &Node) -> Result<Cid> {
        let cid = node.cid();
        if !self.has(&cid) {
            self.write_block(&cid, node.data())?;
        }
        self.cache.lock().put(cid, node.data().to_vec());
        Ok(cid)
    }

    fn has(&self, cid: &Cid) -> bool {
        if self.cache.lock().contains(cid) {
            return true;
        }
        self.block_path(cid).exists()
    }
}
