//! Core types for threads, logs and addresses.

use crate::crypto::{EncryptionKey, Identity};
use crate::error::{Result, ServiceError};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Version byte of the current thread ID layout.
const THREAD_ID_V1: u8 = 0x01;

/// Length of the random component minted by [`ThreadId::new`].
pub const DEFAULT_THREAD_ID_RANDOM_LEN: usize = 16;

/// Access variant carried by a thread ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadVariant {
    /// No access control on the thread.
    Raw,
    /// Thread access is governed by an access-control log.
    AccessControlled,
}

impl ThreadVariant {
    fn code(self) -> u8 {
        match self {
            ThreadVariant::Raw => 0x55,
            ThreadVariant::AccessControlled => 0x70,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0x55 => Some(ThreadVariant::Raw),
            0x70 => Some(ThreadVariant::AccessControlled),
            _ => None,
        }
    }
}

/// Globally unique thread identifier: `[version][variant][random..]`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(Vec<u8>);

impl ThreadId {
    /// Mint a new ID with the default random length.
    pub fn new(variant: ThreadVariant) -> Self {
        Self::with_random_len(variant, DEFAULT_THREAD_ID_RANDOM_LEN)
    }

    /// Mint a new ID with `len` random bytes.
    pub fn with_random_len(variant: ThreadVariant, len: usize) -> Self {
        let mut bytes = vec![0u8; 2 + len];
        bytes[0] = THREAD_ID_V1;
        bytes[1] = variant.code();
        rand::thread_rng().fill_bytes(&mut bytes[2..]);
        ThreadId(bytes)
    }

    /// Decode an ID from its byte form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 3 {
            return Err(ServiceError::InvalidAddress(format!(
                "thread id too short ({} bytes)",
                bytes.len()
            )));
        }
        if bytes[0] != THREAD_ID_V1 {
            return Err(ServiceError::InvalidAddress(format!(
                "unsupported thread id version: {}",
                bytes[0]
            )));
        }
        if ThreadVariant::from_code(bytes[1]).is_none() {
            return Err(ServiceError::InvalidAddress(format!(
                "unknown thread variant: {:#x}",
                bytes[1]
            )));
        }
        Ok(ThreadId(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn variant(&self) -> ThreadVariant {
        ThreadVariant::from_code(self.0[1]).unwrap_or(ThreadVariant::Raw)
    }
}

impl FromStr for ThreadId {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| ServiceError::InvalidAddress(format!("thread id {s}: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({})", self)
    }
}

/// Peer identity, the Ed25519 public key of the peer. Also names the log
/// that peer owns inside a thread.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogId(pub [u8; 32]);

impl LogId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for LogId {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| ServiceError::InvalidAddress(format!("log id {s}: {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            ServiceError::InvalidAddress(format!("log id {s}: expected 32 bytes"))
        })?;
        Ok(LogId(arr))
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_string();
        write!(f, "LogId({}...)", &text[..text.len().min(8)])
    }
}

/// Content identifier (SHA-256 of a node's bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cid(pub [u8; 32]);

impl Cid {
    /// Compute the identifier of some node bytes.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Cid(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Cid(arr))
    }

    /// First byte of the hex form, used to shard block directories.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[0..1])
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        let micros = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Transport endpoint of a peer, in path form (`/ip4/10.0.0.1/tcp/4006`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddr(String);

impl PeerAddr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PeerAddr {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| ServiceError::InvalidAddress(format!("{s}: {reason}"));

        let rest = s.strip_prefix('/').ok_or_else(|| invalid("must start with '/'"))?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() < 2 || segments.iter().any(|seg| seg.is_empty()) {
            return Err(invalid("expected /<protocol>/<value> segments"));
        }
        if segments.iter().any(|seg| *seg == "p2p" || *seg == "thread") {
            return Err(invalid("peer address cannot carry p2p or thread parts"));
        }
        Ok(PeerAddr(s.to_string()))
    }
}

impl TryFrom<String> for PeerAddr {
    type Error = ServiceError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PeerAddr> for String {
    fn from(addr: PeerAddr) -> Self {
        addr.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddr({})", self.0)
    }
}

/// Address of a thread as served by one peer:
/// `<peer addr>/p2p/<log id>/thread/<thread id>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadAddr {
    pub peer: PeerAddr,
    pub log: LogId,
    pub thread: ThreadId,
}

impl FromStr for ThreadAddr {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        let (peer, rest) = s
            .rsplit_once("/p2p/")
            .ok_or_else(|| ServiceError::InvalidAddress(format!("{s}: missing /p2p/ part")))?;
        let (log, thread) = rest
            .split_once("/thread/")
            .ok_or_else(|| ServiceError::InvalidAddress(format!("{s}: missing /thread/ part")))?;

        Ok(ThreadAddr {
            peer: peer.parse()?,
            log: log.parse()?,
            thread: thread.parse()?,
        })
    }
}

impl fmt::Display for ThreadAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/p2p/{}/thread/{}", self.peer, self.log, self.thread)
    }
}

/// Per-(thread, log) bookkeeping kept by the threadstore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogInfo {
    pub id: LogId,
    /// Signing key, present only for logs this peer authors.
    pub priv_key: Option<Identity>,
    /// Key for record bodies.
    pub read_key: Option<EncryptionKey>,
    /// Where the log's owner can be reached.
    pub addrs: Vec<PeerAddr>,
    /// Most recent record, `None` for an empty log.
    pub head: Option<Cid>,
}

impl LogInfo {
    /// Empty metadata for a log authored elsewhere.
    pub fn new(id: LogId) -> Self {
        Self {
            id,
            priv_key: None,
            read_key: None,
            addrs: Vec::new(),
            head: None,
        }
    }

    /// Whether this peer can author records into the log.
    pub fn is_owned(&self) -> bool {
        self.priv_key.is_some()
    }

    /// Copy that is safe to hand to other peers.
    pub fn public(&self) -> Self {
        Self {
            priv_key: None,
            ..self.clone()
        }
    }
}

/// Description of a thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: ThreadId,
    /// Logs in the thread, ordered by ID.
    pub logs: Vec<LogId>,
}
