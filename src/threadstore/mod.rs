//! Durable thread and log bookkeeping.
//!
//! The service reads and mutates per-thread, per-log metadata through
//! [`Threadstore`]. Head updates go through
//! [`Threadstore::compare_and_set_head`], which must be atomic per log.

mod file;
mod index;
mod memory;

pub use file::FileThreadstore;
pub use memory::MemoryThreadstore;

use crate::error::Result;
use crate::types::{Cid, LogId, LogInfo, PeerAddr, ThreadId, ThreadInfo};

/// Thread metadata store.
pub trait Threadstore: Send + Sync {
    /// Register a thread with no logs. `AlreadyExists` if known.
    fn add_thread(&self, id: &ThreadId) -> Result<()>;

    fn has_thread(&self, id: &ThreadId) -> Result<bool>;

    fn thread_info(&self, id: &ThreadId) -> Result<Option<ThreadInfo>>;

    fn threads(&self) -> Result<Vec<ThreadId>>;

    /// Remove a thread and all its logs. Returns false if it was unknown.
    fn delete_thread(&self, id: &ThreadId) -> Result<bool>;

    /// Insert a log if it is not already present. Returns whether it was
    /// inserted; an existing entry is left untouched.
    fn add_log(&self, thread: &ThreadId, info: LogInfo) -> Result<bool>;

    /// `None` if either the thread or the log is unknown.
    fn log_info(&self, thread: &ThreadId, log: &LogId) -> Result<Option<LogInfo>>;

    /// Every log in the thread, ordered by log ID.
    fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>>;

    /// Merge addresses into a log's address list.
    fn add_addrs(&self, thread: &ThreadId, log: &LogId, addrs: &[PeerAddr]) -> Result<()>;

    /// Set the head to `new` iff it currently equals `expected`.
    fn compare_and_set_head(
        &self,
        thread: &ThreadId,
        log: &LogId,
        expected: Option<&Cid>,
        new: &Cid,
    ) -> Result<bool>;
}
