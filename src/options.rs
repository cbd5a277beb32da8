//! Settings for service operations.
//!
//! Each operation takes a list of options that is applied in order over a
//! settings value with defaults. Later options override earlier ones for the
//! same field, except where a field documents otherwise.

use crate::crypto::EncryptionKey;
use crate::types::{LogId, PeerAddr, ThreadId, ThreadVariant, Timestamp};

/// Options for [`Threadservice::add_record`](crate::Threadservice::add_record).
#[derive(Clone, Debug)]
pub enum AddOption {
    /// Target thread.
    Thread(ThreadId),
    /// Wall-clock time associated with the record.
    Time(Timestamp),
    /// Key used to seal the body. Takes precedence over `KeyLog`.
    Key(EncryptionKey),
    /// Seal the body with the read key of this log.
    KeyLog(LogId),
    /// Extra peers to notify about the new record.
    Addrs(Vec<PeerAddr>),
}

/// Values used for an add operation.
#[derive(Clone, Debug)]
pub struct AddSettings {
    pub thread: ThreadId,
    pub time: Timestamp,
    pub key: Option<EncryptionKey>,
    pub key_log: Option<LogId>,
    pub addrs: Vec<PeerAddr>,
}

impl AddSettings {
    /// Defaults are a fresh access-controlled thread and the current time.
    pub fn from_options(opts: impl IntoIterator<Item = AddOption>) -> Self {
        let mut settings = Self {
            thread: ThreadId::new(ThreadVariant::AccessControlled),
            time: Timestamp::now(),
            key: None,
            key_log: None,
            addrs: Vec::new(),
        };
        for opt in opts {
            match opt {
                AddOption::Thread(thread) => settings.thread = thread,
                AddOption::Time(time) => settings.time = time,
                AddOption::Key(key) => settings.key = Some(key),
                AddOption::KeyLog(log) => settings.key_log = Some(log),
                AddOption::Addrs(addrs) => settings.addrs = addrs,
            }
        }
        settings
    }
}

/// Options for [`Threadservice::put_record`](crate::Threadservice::put_record).
#[derive(Clone, Debug)]
pub enum PutOption {
    Thread(ThreadId),
    Log(LogId),
}

/// Values used for a put operation.
#[derive(Clone, Debug)]
pub struct PutSettings {
    pub thread: ThreadId,
    pub log: Option<LogId>,
}

impl PutSettings {
    pub fn from_options(opts: impl IntoIterator<Item = PutOption>) -> Self {
        let mut settings = Self {
            thread: ThreadId::new(ThreadVariant::AccessControlled),
            log: None,
        };
        for opt in opts {
            match opt {
                PutOption::Thread(thread) => settings.thread = thread,
                PutOption::Log(log) => settings.log = Some(log),
            }
        }
        settings
    }
}

/// Options for [`Threadservice::subscribe`](crate::Threadservice::subscribe).
#[derive(Clone, Debug)]
pub enum ListenOption {
    /// Restrict to a thread. Repeat to listen to several threads.
    Thread(ThreadId),
}

/// Values used for a listen operation.
#[derive(Clone, Debug, Default)]
pub struct ListenSettings {
    /// Allow-list of threads; empty means every thread.
    pub threads: Vec<ThreadId>,
}

impl ListenSettings {
    pub fn from_options(opts: impl IntoIterator<Item = ListenOption>) -> Self {
        let mut settings = Self::default();
        for opt in opts {
            match opt {
                ListenOption::Thread(thread) => {
                    if !settings.threads.contains(&thread) {
                        settings.threads.push(thread);
                    }
                }
            }
        }
        settings
    }

    pub fn matches(&self, thread: &ThreadId) -> bool {
        self.threads.is_empty() || self.threads.contains(thread)
    }
}

/// Options for [`Threadservice::pull`](crate::Threadservice::pull).
#[derive(Clone, Debug)]
pub enum PullOption {
    /// Maximum records in the page.
    Limit(usize),
}

/// Values used for a pull operation.
#[derive(Clone, Debug, Default)]
pub struct PullSettings {
    /// Page size; `None` uses the service's configured page size.
    pub limit: Option<usize>,
}

impl PullSettings {
    pub fn from_options(opts: impl IntoIterator<Item = PullOption>) -> Self {
        let mut settings = Self::default();
        for opt in opts {
            match opt {
                PullOption::Limit(limit) => settings.limit = Some(limit),
            }
        }
        settings
    }
}
