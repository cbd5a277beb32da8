//! Peer-to-peer plumbing.
//!
//! The service reaches other peers only through [`Host`]. Transport, dialing
//! and wire encoding live behind that trait. The inbound side is
//! [`PeerService`], which [`Threadservice`](crate::Threadservice) implements
//! so a host can route requests to it.
//!
//! [`MemoryHost`] connects services living in one process and is what the
//! test suites use to model several peers.

mod dag;
mod memory;

pub use dag::NetworkDag;
pub use memory::MemoryHost;

use crate::context::Context;
use crate::error::Result;
use crate::records::Record;
use crate::types::{Cid, LogId, LogInfo, PeerAddr, ThreadId};

/// Outbound requests to other peers.
///
/// Every call takes the caller's [`Context`] and must give up with
/// `Cancelled` or `DeadlineExceeded` once it is done.
pub trait Host: Send + Sync {
    /// Check that a peer answers at `addr`.
    fn connect(&self, ctx: &Context, addr: &PeerAddr) -> Result<()>;

    /// Public metadata for every log the peer tracks in `thread`.
    fn thread_logs(&self, ctx: &Context, addr: &PeerAddr, thread: &ThreadId)
        -> Result<Vec<LogInfo>>;

    /// The peer's current head of a log.
    fn log_head(
        &self,
        ctx: &Context,
        addr: &PeerAddr,
        thread: &ThreadId,
        log: &LogId,
    ) -> Result<Option<Cid>>;

    /// Raw block bytes held by the peer. The caller verifies the hash.
    fn fetch_block(&self, ctx: &Context, addr: &PeerAddr, cid: &Cid) -> Result<Option<Vec<u8>>>;

    /// Offer a new record. `from` is where the sender can be reached.
    fn push_record(
        &self,
        ctx: &Context,
        addr: &PeerAddr,
        record: &Record,
        from: &[PeerAddr],
    ) -> Result<()>;
}

/// Inbound side of [`Host`].
pub trait PeerService: Send + Sync {
    fn serve_thread_logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>>;

    fn serve_log_head(&self, thread: &ThreadId, log: &LogId) -> Result<Option<Cid>>;

    /// Local blocks only; never forwards.
    fn serve_block(&self, cid: &Cid) -> Result<Option<Vec<u8>>>;

    fn receive_record(&self, record: Record, from: &[PeerAddr]) -> Result<()>;
}
