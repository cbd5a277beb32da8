//! Records as seen at the service boundary.

use super::LogRecord;
use crate::types::{Cid, LogId, ThreadId};

/// A chain record together with the thread and log it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    value: LogRecord,
    thread: ThreadId,
    log: LogId,
}

impl Record {
    pub fn new(value: LogRecord, thread: ThreadId, log: LogId) -> Self {
        Self { value, thread, log }
    }

    /// The underlying chain record.
    pub fn value(&self) -> &LogRecord {
        &self.value
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread
    }

    pub fn log_id(&self) -> LogId {
        self.log
    }

    pub fn cid(&self) -> Cid {
        self.value.cid
    }

    pub fn into_value(self) -> LogRecord {
        self.value
    }
}
