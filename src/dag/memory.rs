//! In-memory block store.

use super::{DagStore, Node};
use crate::error::Result;
use crate::types::Cid;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Block store kept entirely in memory.
#[derive(Default)]
pub struct MemoryDagStore {
    blocks: RwLock<HashMap<Cid, Vec<u8>>>,
}

impl MemoryDagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl DagStore for MemoryDagStore {
    fn get(&self, cid: &Cid) -> Result<Option<Node>> {
        Ok(self
            .blocks
            .read()
            .get(cid)
            .map(|data| Node::new(data.clone())))
    }

    fn put(&self, node: &Node) -> Result<Cid> {
        self.blocks
            .write()
            .entry(node.cid())
            .or_insert_with(|| node.data().to_vec());
        Ok(node.cid())
    }

    fn has(&self, cid: &Cid) -> bool {
        self.blocks.read().contains_key(cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let store = MemoryDagStore::new();
        let node = Node::new(b"hello".to_vec());

        let cid = store.put(&node).unwrap();
        assert_eq!(cid, node.cid());
        assert!(store.has(&cid));
        assert_eq!(store.get(&cid).unwrap(), Some(node));
    }

    #[test]
    fn test_put_is_idempotent() {
        let store = MemoryDagStore::new();
        let node = Node::new(b"same".to_vec());
        store.put(&node).unwrap();
        store.put(&node).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_block() {
        let store = MemoryDagStore::new();
        assert!(store.get(&Cid::of(b"absent")).unwrap().is_none());
        assert!(!store.has(&Cid::of(b"absent")));
    }
}
