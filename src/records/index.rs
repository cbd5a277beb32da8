//! Record positions within log chains.

use crate::error::Result;
use crate::types::{Cid, LogId, ThreadId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Cids of one log, oldest first.
#[derive(Default)]
struct LogChain {
    cids: Vec<Cid>,
    positions: HashMap<Cid, usize>,
}

impl LogChain {
    fn tip(&self) -> Option<Cid> {
        self.cids.last().copied()
    }

    fn push(&mut self, cid: Cid) {
        self.positions.insert(cid, self.cids.len());
        self.cids.push(cid);
    }

    /// Bring the chain up to `head`, walking back with `prev_of` until the
    /// indexed tip is reached. A head that does not extend the tip replaces
    /// the chain.
    fn catch_up<F>(&mut self, head: Option<Cid>, prev_of: &mut F) -> Result<()>
    where
        F: FnMut(&Cid) -> Result<Option<Cid>>,
    {
        let mut newer = Vec::new();
        let mut cursor = head;
        while cursor != self.tip() {
            let Some(cid) = cursor else {
                *self = LogChain::default();
                break;
            };
            if self.positions.contains_key(&cid) {
                // Head behind the tip
                *self = LogChain::default();
                return self.catch_up(head, prev_of);
            }
            newer.push(cid);
            cursor = prev_of(&cid)?;
        }

        for cid in newer.into_iter().rev() {
            self.push(cid);
        }
        Ok(())
    }
}

/// In-memory index of every log's chain, kept in step with head updates.
///
/// A log is indexed on first read by walking back from its head; later
/// reads only decode records added since. Paging through a log of n records
/// therefore decodes each record once instead of once per page.
#[derive(Default)]
pub struct ChainIndex {
    chains: RwLock<HashMap<(ThreadId, LogId), LogChain>>,
}

impl ChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that `cid`, linking to `prev`, is the new head of a log.
    pub fn advance(&self, thread: &ThreadId, log: &LogId, prev: Option<&Cid>, cid: Cid) {
        let key = (thread.clone(), *log);
        let mut chains = self.chains.write();
        match chains.get_mut(&key) {
            Some(chain) if chain.tip().as_ref() == prev => chain.push(cid),
            Some(_) => {
                chains.remove(&key);
            }
            None if prev.is_none() => {
                let mut chain = LogChain::default();
                chain.push(cid);
                chains.insert(key, chain);
            }
            // Unindexed logs are built on first read
            None => {}
        }
    }

    /// Forget every log of a thread.
    pub fn remove_thread(&self, thread: &ThreadId) {
        self.chains.write().retain(|(t, _), _| t != thread);
    }

    /// Up to `limit` cids strictly after `offset`, oldest first, in a log
    /// whose head is `head`. `None` if `offset` is not in the chain.
    pub fn page<F>(
        &self,
        thread: &ThreadId,
        log: &LogId,
        head: Option<Cid>,
        offset: Option<&Cid>,
        limit: usize,
        mut prev_of: F,
    ) -> Result<Option<Vec<Cid>>>
    where
        F: FnMut(&Cid) -> Result<Option<Cid>>,
    {
        self.with_chain(thread, log, head, &mut prev_of, |chain| {
            let start = match offset {
                None => 0,
                Some(cid) => match chain.positions.get(cid) {
                    Some(pos) => pos + 1,
                    None => return None,
                },
            };
            Some(chain.cids.iter().skip(start).take(limit).copied().collect())
        })
    }

    /// Whether `cid` is part of a log whose head is `head`.
    pub fn contains<F>(
        &self,
        thread: &ThreadId,
        log: &LogId,
        head: Option<Cid>,
        cid: &Cid,
        mut prev_of: F,
    ) -> Result<bool>
    where
        F: FnMut(&Cid) -> Result<Option<Cid>>,
    {
        self.with_chain(thread, log, head, &mut prev_of, |chain| {
            chain.positions.contains_key(cid)
        })
    }

    fn with_chain<F, T>(
        &self,
        thread: &ThreadId,
        log: &LogId,
        head: Option<Cid>,
        prev_of: &mut F,
        read: impl FnOnce(&LogChain) -> T,
    ) -> Result<T>
    where
        F: FnMut(&Cid) -> Result<Option<Cid>>,
    {
        let key = (thread.clone(), *log);
        {
            let chains = self.chains.read();
            if let Some(chain) = chains.get(&key) {
                if chain.tip() == head {
                    return Ok(read(chain));
                }
            }
        }

        let mut chains = self.chains.write();
        let chain = chains.entry(key).or_default();
        chain.catch_up(head, prev_of)?;
        Ok(read(chain))
    }
}
