//! Block store that falls back to other peers.

use super::Host;
use crate::context::Context;
use crate::dag::{DagStore, Node};
use crate::error::Result;
use crate::types::{Cid, PeerAddr};
use std::sync::Arc;
use tracing::{debug, warn};

/// Local [`DagStore`] whose `fetch` asks providers through a [`Host`] for
/// missing blocks. Fetched blocks are verified and kept locally.
pub struct NetworkDag {
    local: Arc<dyn DagStore>,
    host: Arc<dyn Host>,
}

impl NetworkDag {
    pub fn new(local: Arc<dyn DagStore>, host: Arc<dyn Host>) -> Self {
        Self { local, host }
    }
}

impl DagStore for NetworkDag {
    fn get(&self, cid: &Cid) -> Result<Option<Node>> {
        self.local.get(cid)
    }

    fn put(&self, node: &Node) -> Result<Cid> {
        self.local.put(node)
    }

    fn has(&self, cid: &Cid) -> bool {
        self.local.has(cid)
    }

    fn fetch(&self, ctx: &Context, cid: &Cid, providers: &[PeerAddr]) -> Result<Option<Node>> {
        ctx.check()?;
        if let Some(node) = self.local.get(cid)? {
            return Ok(Some(node));
        }

        let mut last_err = None;
        for provider in providers {
            ctx.check()?;
            let data = match self.host.fetch_block(ctx, provider, cid) {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) if e.is_context_error() => return Err(e),
                Err(e) => {
                    debug!(cid = %cid, provider = %provider, error = %e, "block fetch failed");
                    last_err = Some(e);
                    continue;
                }
            };

            match Node::verified(*cid, data) {
                Ok(node) => {
                    self.local.put(&node)?;
                    return Ok(Some(node));
                }
                Err(e) => {
                    warn!(cid = %cid, provider = %provider, "provider sent a block with the wrong hash");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::MemoryDagStore;
    use crate::error::ServiceError;
    use crate::net::{MemoryHost, PeerService};
    use crate::records::Record;
    use crate::types::{LogId, LogInfo, ThreadId};

    struct BlockServer {
        blocks: MemoryDagStore,
        corrupt: bool,
    }

    impl PeerService for BlockServer {
        fn serve_thread_logs(&self, _thread: &ThreadId) -> Result<Vec<LogInfo>> {
            Ok(Vec::new())
        }

        fn serve_log_head(&self, _thread: &ThreadId, _log: &LogId) -> Result<Option<Cid>> {
            Ok(None)
        }

        fn serve_block(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
            if self.corrupt {
                return Ok(Some(b"garbage".to_vec()));
            }
            Ok(self.blocks.get(cid)?.map(Node::into_data))
        }

        fn receive_record(&self, _record: Record, _from: &[PeerAddr]) -> Result<()> {
            Ok(())
        }
    }

    fn setup(corrupt: bool) -> (NetworkDag, Arc<BlockServer>, PeerAddr) {
        let host = Arc::new(MemoryHost::new());
        let server = Arc::new(BlockServer {
            blocks: MemoryDagStore::new(),
            corrupt,
        });
        let addr: PeerAddr = "/mem/server".parse().unwrap();
        host.register(addr.clone(), &server);

        let dag = NetworkDag::new(Arc::new(MemoryDagStore::new()), host);
        (dag, server, addr)
    }

    #[test]
    fn test_fetch_from_provider_caches_locally() {
        let (dag, server, addr) = setup(false);
        let node = Node::new(b"remote block".to_vec());
        server.blocks.put(&node).unwrap();

        let ctx = Context::background();
        assert!(!dag.has(&node.cid()));
        let fetched = dag.fetch(&ctx, &node.cid(), &[addr]).unwrap();
        assert_eq!(fetched, Some(node.clone()));
        assert!(dag.has(&node.cid()));
    }

    #[test]
    fn test_fetch_missing_everywhere() {
        let (dag, _server, addr) = setup(false);
        let ctx = Context::background();
        assert_eq!(dag.fetch(&ctx, &Cid::of(b"nope"), &[addr]).unwrap(), None);
    }

    #[test]
    fn test_fetch_rejects_wrong_hash() {
        let (dag, _server, addr) = setup(true);
        let ctx = Context::background();
        let cid = Cid::of(b"wanted");
        assert!(matches!(
            dag.fetch(&ctx, &cid, &[addr]),
            Err(ServiceError::HashMismatch { .. })
        ));
        assert!(!dag.has(&cid));
    }

    #[test]
    fn test_fetch_unreachable_provider() {
        let (dag, _server, _addr) = setup(false);
        let ctx = Context::background();
        let missing: PeerAddr = "/mem/missing".parse().unwrap();
        assert!(matches!(
            dag.fetch(&ctx, &Cid::of(b"x"), &[missing]),
            Err(ServiceError::Unreachable(_))
        ));
    }
}
