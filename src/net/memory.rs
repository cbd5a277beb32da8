//! In-process host.

use super::{Host, PeerService};
use crate::context::Context;
use crate::error::{Result, ServiceError};
use crate::records::Record;
use crate::types::{Cid, LogId, LogInfo, PeerAddr, ThreadId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// Granularity of simulated latency, so cancellation is noticed quickly.
const LATENCY_STEP: Duration = Duration::from_millis(5);

/// Routes [`Host`] calls to services registered under an address.
///
/// Services are held weakly so a service that owns this host can be dropped.
/// Addresses can be marked unreachable and every call can be slowed down to
/// exercise failure and cancellation paths.
#[derive(Default)]
pub struct MemoryHost {
    peers: RwLock<HashMap<PeerAddr, Weak<dyn PeerService>>>,
    unreachable: RwLock<HashSet<PeerAddr>>,
    latency: RwLock<Option<Duration>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `service` at `addr`, replacing any earlier registration.
    pub fn register<S: PeerService + 'static>(&self, addr: PeerAddr, service: &Arc<S>) {
        let service: Arc<dyn PeerService> = service.clone();
        debug!(addr = %addr, "peer registered");
        self.peers.write().insert(addr, Arc::downgrade(&service));
    }

    pub fn unregister(&self, addr: &PeerAddr) -> bool {
        self.peers.write().remove(addr).is_some()
    }

    /// Make an address fail with `Unreachable` without forgetting it.
    pub fn set_reachable(&self, addr: &PeerAddr, reachable: bool) {
        let mut unreachable = self.unreachable.write();
        if reachable {
            unreachable.remove(addr);
        } else {
            unreachable.insert(addr.clone());
        }
    }

    /// Delay applied before every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    fn peer(&self, ctx: &Context, addr: &PeerAddr) -> Result<Arc<dyn PeerService>> {
        ctx.check()?;
        self.delay(ctx)?;

        if self.unreachable.read().contains(addr) {
            return Err(ServiceError::Unreachable(addr.to_string()));
        }
        self.peers
            .read()
            .get(addr)
            .and_then(Weak::upgrade)
            .ok_or_else(|| ServiceError::Unreachable(addr.to_string()))
    }

    fn delay(&self, ctx: &Context) -> Result<()> {
        let Some(latency) = *self.latency.read() else {
            return Ok(());
        };
        let mut left = latency;
        while !left.is_zero() {
            let step = left.min(LATENCY_STEP);
            std::thread::sleep(step);
            left -= step;
            ctx.check()?;
        }
        Ok(())
    }
}

impl Host for MemoryHost {
    fn connect(&self, ctx: &Context, addr: &PeerAddr) -> Result<()> {
        self.peer(ctx, addr).map(|_| ())
    }

    fn thread_logs(
        &self,
        ctx: &Context,
        addr: &PeerAddr,
        thread: &ThreadId,
    ) -> Result<Vec<LogInfo>> {
        self.peer(ctx, addr)?.serve_thread_logs(thread)
    }

    fn log_head(
        &self,
        ctx: &Context,
        addr: &PeerAddr,
        thread: &ThreadId,
        log: &LogId,
    ) -> Result<Option<Cid>> {
        self.peer(ctx, addr)?.serve_log_head(thread, log)
    }

    fn fetch_block(&self, ctx: &Context, addr: &PeerAddr, cid: &Cid) -> Result<Option<Vec<u8>>> {
        self.peer(ctx, addr)?.serve_block(cid)
    }

    fn push_record(
        &self,
        ctx: &Context,
        addr: &PeerAddr,
        record: &Record,
        from: &[PeerAddr],
    ) -> Result<()> {
        self.peer(ctx, addr)?.receive_record(record.clone(), from)
    }
}
