//! Error types for the thread service.

use crate::types::{Cid, LogId, ThreadId};
use std::fmt;
use thiserror::Error;

/// Main error type for thread service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thread not found: {0}")]
    ThreadNotFound(ThreadId),

    #[error("Log {log} not found in thread {thread}")]
    LogNotFound { thread: ThreadId, log: LogId },

    #[error("Record not found: {0}")]
    RecordNotFound(Cid),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Thread already exists: {0}")]
    AlreadyExists(ThreadId),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Partial failure: {0}")]
    PartialFailure(PullFailure),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Head of log {log} in thread {thread} moved concurrently ({attempts} attempts)")]
    Conflict {
        thread: ThreadId,
        log: LogId,
        attempts: usize,
    },

    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: Cid, got: Cid },
}

impl ServiceError {
    /// True for the thread, log and record lookup failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::ThreadNotFound(_)
                | ServiceError::LogNotFound { .. }
                | ServiceError::RecordNotFound(_)
        )
    }

    /// True when the caller's context ended the operation.
    pub fn is_context_error(&self) -> bool {
        matches!(self, ServiceError::Cancelled | ServiceError::DeadlineExceeded)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for ServiceError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        ServiceError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ServiceError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        ServiceError::Deserialization(e.to_string())
    }
}

/// A log that could not be synchronized during a thread pull.
#[derive(Debug)]
pub struct LogFailure {
    pub log: LogId,
    pub error: Box<ServiceError>,
}

/// Outcome of a thread pull in which at least one log failed.
#[derive(Debug, Default)]
pub struct PullFailure {
    /// Logs that were brought up to date.
    pub succeeded: Vec<LogId>,
    /// Logs that failed, with the reason.
    pub failed: Vec<LogFailure>,
}

impl PullFailure {
    /// Whether the given log is among the failures.
    pub fn failed_log(&self, log: &LogId) -> Option<&ServiceError> {
        self.failed
            .iter()
            .find(|f| &f.log == log)
            .map(|f| f.error.as_ref())
    }
}

impl fmt::Display for PullFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} logs failed",
            self.failed.len(),
            self.failed.len() + self.succeeded.len()
        )?;
        for failure in &self.failed {
            write!(f, "; {}: {}", failure.log, failure.error)?;
        }
        Ok(())
    }
}

/// Result type for thread service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
