//! Content-addressed block storage.
//!
//! Blocks are immutable byte strings addressed by the SHA-256 of their
//! contents. The service consumes storage through [`DagStore`]; this module
//! also ships an in-memory store and a sharded on-disk store.

mod file;
mod memory;

pub use file::FileDagStore;
pub use memory::MemoryDagStore;

use crate::context::Context;
use crate::error::{Result, ServiceError};
use crate::types::{Cid, PeerAddr};

/// An immutable block and its content identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    cid: Cid,
    data: Vec<u8>,
}

impl Node {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            cid: Cid::of(&data),
            data,
        }
    }

    /// Rebuild a node received under `cid`, rejecting mismatched content.
    pub fn verified(cid: Cid, data: Vec<u8>) -> Result<Self> {
        let got = Cid::of(&data);
        if got != cid {
            return Err(ServiceError::HashMismatch { expected: cid, got });
        }
        Ok(Self { cid, data })
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Content-addressed block store.
pub trait DagStore: Send + Sync {
    /// Local lookup.
    fn get(&self, cid: &Cid) -> Result<Option<Node>>;

    /// Store a block. Idempotent.
    fn put(&self, node: &Node) -> Result<Cid>;

    fn has(&self, cid: &Cid) -> bool;

    /// Resolve a block, asking `providers` when it is not held locally.
    ///
    /// Stores without network access only look locally.
    fn fetch(&self, ctx: &Context, cid: &Cid, providers: &[PeerAddr]) -> Result<Option<Node>> {
        let _ = providers;
        ctx.check()?;
        self.get(cid)
    }
}
