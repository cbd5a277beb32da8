//! Thread index shared by the threadstore implementations.

use crate::error::{Result, ServiceError};
use crate::types::{Cid, LogId, LogInfo, PeerAddr, ThreadId, ThreadInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Threads and their logs, ordered by ID.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct ThreadIndex {
    threads: BTreeMap<ThreadId, BTreeMap<LogId, LogInfo>>,
}

impl ThreadIndex {
    pub fn add_thread(&mut self, id: &ThreadId) -> Result<()> {
        if self.threads.contains_key(id) {
            return Err(ServiceError::AlreadyExists(id.clone()));
        }
        self.threads.insert(id.clone(), BTreeMap::new());
        Ok(())
    }

    pub fn has_thread(&self, id: &ThreadId) -> bool {
        self.threads.contains_key(id)
    }

    pub fn thread_info(&self, id: &ThreadId) -> Option<ThreadInfo> {
        self.threads.get(id).map(|logs| ThreadInfo {
            id: id.clone(),
            logs: logs.keys().copied().collect(),
        })
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.keys().cloned().collect()
    }

    pub fn delete_thread(&mut self, id: &ThreadId) -> bool {
        self.threads.remove(id).is_some()
    }

    pub fn add_log(&mut self, thread: &ThreadId, info: LogInfo) -> Result<bool> {
        let logs = self
            .threads
            .get_mut(thread)
            .ok_or_else(|| ServiceError::ThreadNotFound(thread.clone()))?;
        if logs.contains_key(&info.id) {
            return Ok(false);
        }
        logs.insert(info.id, info);
        Ok(true)
    }

    pub fn log_info(&self, thread: &ThreadId, log: &LogId) -> Option<LogInfo> {
        self.threads.get(thread)?.get(log).cloned()
    }

    pub fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>> {
        self.threads
            .get(thread)
            .map(|logs| logs.values().cloned().collect())
            .ok_or_else(|| ServiceError::ThreadNotFound(thread.clone()))
    }

    pub fn add_addrs(&mut self, thread: &ThreadId, log: &LogId, addrs: &[PeerAddr]) -> Result<()> {
        let info = self.log_mut(thread, log)?;
        for addr in addrs {
            if !info.addrs.contains(addr) {
                info.addrs.push(addr.clone());
            }
        }
        Ok(())
    }

    pub fn compare_and_set_head(
        &mut self,
        thread: &ThreadId,
        log: &LogId,
        expected: Option<&Cid>,
        new: &Cid,
    ) -> Result<bool> {
        let info = self.log_mut(thread, log)?;
        if info.head.as_ref() != expected {
            return Ok(false);
        }
        info.head = Some(*new);
        Ok(true)
    }

    fn log_mut(&mut self, thread: &ThreadId, log: &LogId) -> Result<&mut LogInfo> {
        self.threads
            .get_mut(thread)
            .and_then(|logs| logs.get_mut(log))
            .ok_or_else(|| ServiceError::LogNotFound {
                thread: thread.clone(),
                log: *log,
            })
    }
}
