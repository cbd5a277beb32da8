//! In-memory threadstore.

use super::index::ThreadIndex;
use super::Threadstore;
use crate::error::Result;
use crate::types::{Cid, LogId, LogInfo, PeerAddr, ThreadId, ThreadInfo};
use parking_lot::RwLock;

/// Threadstore that lives only as long as the process.
#[derive(Default)]
pub struct MemoryThreadstore {
    index: RwLock<ThreadIndex>,
}

impl MemoryThreadstore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Threadstore for MemoryThreadstore {
    fn add_thread(&self, id: &ThreadId) -> Result<()> {
        self.index.write().add_thread(id)
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
        Ok(self.index.write().delete_thread(id))
    }

    fn add_log(&self, thread: &ThreadId, info: LogInfo) -> Result<bool> {
        self.index.write().add_log(thread, info)
    }

    fn log_info(&self, thread: &ThreadId, log: &LogId) -> Result<Option<LogInfo>> {
        Ok(self.index.read().log_info(thread, log))
    }

    fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>> {
        self.index.read().logs(thread)
    }

    fn add_addrs(&self, thread: &ThreadId, log: &LogId, addrs: &[PeerAddr]) -> Result<()> {
        self.index.write().add_addrs(thread, log, addrs)
    }

    fn compare_and_set_head(
        &self,
        thread: &ThreadId,
        log: &LogId,
        expected: Option<&Cid>,
        new: &Cid,
    ) -> Result<bool> {
        self.index
            .write()
            .compare_and_set_head(thread, log, expected, new)
    }
}
