//! Main Threadservice tying storage, network and subscriptions together.

use crate::config::ServiceConfig;
use crate::context::Context;
use crate::crypto::{EncryptionKey, Identity};
use crate::dag::{DagStore, FileDagStore, MemoryDagStore, Node};
use crate::error::{LogFailure, PullFailure, Result, ServiceError};
use crate::net::{Host, NetworkDag, PeerService};
use crate::options::{
    AddOption, AddSettings, ListenOption, ListenSettings, PullOption, PullSettings, PutOption,
    PutSettings,
};
use crate::records::{ChainIndex, LogRecord, Record};
use crate::subscriptions::{Subscription, SubscriptionManager};
use crate::threadstore::{FileThreadstore, MemoryThreadstore, Threadstore};
use crate::types::{Cid, LogId, LogInfo, PeerAddr, ThreadAddr, ThreadId, ThreadInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a thread pull in which every log synchronized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// Logs that were checked or brought up to date.
    pub synced: Vec<LogId>,
    /// Records applied from other peers.
    pub records: usize,
}

/// A peer's view of a set of threads.
///
/// Provides a unified interface for:
/// - Joining, synchronizing and deleting threads
/// - Appending records to this peer's own log in a thread
/// - Validating records produced elsewhere
/// - Paging through a log and subscribing to new records
///
/// All operations may be called concurrently from many threads. Head updates
/// for one (thread, log) pair are serialized; different logs never contend.
pub struct Threadservice {
    /// Service configuration.
    config: ServiceConfig,

    /// Key of the log this peer authors in every thread.
    identity: Identity,

    /// Block store, falling back to peers for missing blocks.
    dag: Arc<dyn DagStore>,

    /// Thread and log metadata.
    store: Arc<dyn Threadstore>,

    /// Outbound network access.
    host: Arc<dyn Host>,

    /// Live record feeds.
    subscriptions: Arc<SubscriptionManager>,

    /// Head mutation locks, one per (thread, log).
    log_locks: Mutex<HashMap<(ThreadId, LogId), Arc<Mutex<()>>>>,

    /// Chain positions for paging and membership checks.
    index: ChainIndex,
}

impl Threadservice {
    /// Compose a service from its collaborators.
    pub fn new(
        config: ServiceConfig,
        identity: Identity,
        dag: Arc<dyn DagStore>,
        store: Arc<dyn Threadstore>,
        host: Arc<dyn Host>,
    ) -> Result<Self> {
        config.validate()?;

        let dag: Arc<dyn DagStore> = Arc::new(NetworkDag::new(dag, Arc::clone(&host)));
        let subscriptions = Arc::new(SubscriptionManager::with_buffer_size(
            config.subscription_buffer,
        ));

        info!(log = %identity.log_id(), "thread service started");

        Ok(Self {
            config,
            identity,
            dag,
            store,
            host,
            subscriptions,
            log_locks: Mutex::new(HashMap::new()),
            index: ChainIndex::new(),
        })
    }

    /// Open a service persisted under `config.data_dir`.
    ///
    /// The peer identity is loaded from the data directory, or generated and
    /// saved there on first use.
    pub fn open(config: ServiceConfig, host: Arc<dyn Host>) -> Result<Self> {
        let missing = || ServiceError::Config("data_dir is required for a persistent service".into());
        let blocks_path = config.blocks_path().ok_or_else(missing)?;
        let threads_path = config.threadstore_path().ok_or_else(missing)?;
        let identity_path = config.identity_path().ok_or_else(missing)?;

        let identity = Identity::load_or_generate(identity_path)?;
        let dag = Arc::new(FileDagStore::new(blocks_path, config.block_cache_size)?);
        let store = Arc::new(FileThreadstore::open(threads_path)?);

        Self::new(config, identity, dag, store, host)
    }

    /// A service with in-memory storage.
    pub fn in_memory(config: ServiceConfig, identity: Identity, host: Arc<dyn Host>) -> Result<Self> {
        Self::new(
            config,
            identity,
            Arc::new(MemoryDagStore::new()),
            Arc::new(MemoryThreadstore::new()),
            host,
        )
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// ID of the log this peer authors.
    pub fn log_id(&self) -> LogId {
        self.identity.log_id()
    }

    pub fn dag(&self) -> &Arc<dyn DagStore> {
        &self.dag
    }

    pub fn store(&self) -> &Arc<dyn Threadstore> {
        &self.store
    }

    // =========================================================================
    // Threads
    // =========================================================================

    /// Join a thread served by another peer.
    ///
    /// Registers the thread and the public metadata of its logs. No record
    /// content is fetched; call [`pull_thread`](Self::pull_thread) for that.
    pub fn add_thread(&self, ctx: &Context, addr: &str) -> Result<ThreadInfo> {
        ctx.check()?;
        let addr: ThreadAddr = addr.parse()?;

        if self.store.has_thread(&addr.thread)? {
            return Err(ServiceError::AlreadyExists(addr.thread));
        }

        self.host.connect(ctx, &addr.peer)?;
        let remote_logs = self.host.thread_logs(ctx, &addr.peer, &addr.thread)?;
        ctx.check()?;

        self.store.add_thread(&addr.thread)?;

        let own = self.log_id();
        let mut saw_addressed = false;
        for remote in remote_logs {
            if remote.id == own {
                debug!(thread = %addr.thread, "skipping own log offered by peer");
                continue;
            }

            let mut log = remote.public();
            log.head = None;
            if log.id == addr.log {
                saw_addressed = true;
                if !log.addrs.contains(&addr.peer) {
                    log.addrs.push(addr.peer.clone());
                }
            } else if log.addrs.is_empty() {
                log.addrs.push(addr.peer.clone());
            }
            self.store.add_log(&addr.thread, log)?;
        }

        if !saw_addressed && addr.log != own {
            let mut log = LogInfo::new(addr.log);
            log.addrs.push(addr.peer.clone());
            self.store.add_log(&addr.thread, log)?;
        }

        let thread = self.thread_info(&addr.thread)?;
        info!(thread = %addr.thread, peer = %addr.peer, logs = thread.logs.len(), "thread added");
        Ok(thread)
    }

    /// Bring every log of a thread up to date.
    ///
    /// Logs this peer owns are checked locally. Other logs are fetched from
    /// their addresses. If any log fails the rest still sync and the error is
    /// `PartialFailure` naming each failed log.
    pub fn pull_thread(&self, ctx: &Context, thread: &ThreadId) -> Result<PullSummary> {
        ctx.check()?;
        let logs = self.store.logs(thread)?;

        let mut summary = PullSummary::default();
        let mut failed = Vec::new();

        for log in logs {
            ctx.check()?;
            let result = if log.is_owned() {
                self.verify_local_log(ctx, thread, &log).map(|()| 0)
            } else {
                self.sync_log(ctx, thread, &log)
            };

            match result {
                Ok(applied) => {
                    summary.synced.push(log.id);
                    summary.records += applied;
                }
                Err(e) if e.is_context_error() => return Err(e),
                Err(e) => {
                    warn!(thread = %thread, log = %log.id, error = %e, "log pull failed");
                    failed.push(LogFailure {
                        log: log.id,
                        error: Box::new(e),
                    });
                }
            }
        }

        if !failed.is_empty() {
            return Err(ServiceError::PartialFailure(PullFailure {
                succeeded: summary.synced,
                failed,
            }));
        }

        debug!(thread = %thread, records = summary.records, "thread pulled");
        Ok(summary)
    }

    /// Remove a thread and all of its log metadata. Blocks are left in place.
    pub fn delete_thread(&self, ctx: &Context, thread: &ThreadId) -> Result<()> {
        ctx.check()?;
        if !self.store.delete_thread(thread)? {
            return Err(ServiceError::ThreadNotFound(thread.clone()));
        }
        self.log_locks.lock().retain(|(t, _), _| t != thread);
        self.index.remove_thread(thread);

        info!(thread = %thread, "thread deleted");
        Ok(())
    }

    /// Metadata of every log in a thread, ordered by log ID.
    pub fn logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>> {
        self.store.logs(thread)
    }

    pub fn threads(&self) -> Result<Vec<ThreadId>> {
        self.store.threads()
    }

    pub fn thread_info(&self, thread: &ThreadId) -> Result<ThreadInfo> {
        self.store
            .thread_info(thread)?
            .ok_or_else(|| ServiceError::ThreadNotFound(thread.clone()))
    }

    /// Record additional addresses for a log.
    pub fn add_log_addrs(&self, thread: &ThreadId, log: &LogId, addrs: &[PeerAddr]) -> Result<()> {
        self.store.add_addrs(thread, log, addrs)
    }

    /// Address other peers use to join `thread` through this peer.
    pub fn thread_addr(&self, thread: &ThreadId) -> Result<ThreadAddr> {
        if !self.store.has_thread(thread)? {
            return Err(ServiceError::ThreadNotFound(thread.clone()));
        }
        let peer = self
            .config
            .listen_addrs
            .first()
            .cloned()
            .ok_or_else(|| ServiceError::Config("no listen address configured".into()))?;

        Ok(ThreadAddr {
            peer,
            log: self.log_id(),
            thread: thread.clone(),
        })
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Append `body` to this peer's log in the target thread.
    ///
    /// The thread and the log are created on first use. The body is sealed
    /// with the resolved key, linked to the current head and signed. On
    /// success the record is delivered to subscribers and, when enabled,
    /// pushed to the thread's other peers.
    pub fn add_record(
        &self,
        ctx: &Context,
        body: &[u8],
        opts: impl IntoIterator<Item = AddOption>,
    ) -> Result<Record> {
        ctx.check()?;
        let settings = AddSettings::from_options(opts);
        let thread = settings.thread.clone();

        let own = self.own_log(&thread)?;
        let author = own.priv_key.clone().ok_or_else(|| {
            ServiceError::PermissionDenied(format!("no private key for log {}", own.id))
        })?;
        let key = self.resolve_key(&thread, &settings, &own)?;
        let log = own.id;

        let record = {
            let lock = self.log_lock(&thread, &log);
            let _guard = lock.lock();

            let mut attempts = 0;
            loop {
                attempts += 1;
                let head = self.head(&thread, &log)?;
                let value = LogRecord::create(&thread, &author, head, settings.time, body, &key)?;
                self.dag.put(&value.to_node()?)?;

                if self
                    .store
                    .compare_and_set_head(&thread, &log, head.as_ref(), &value.cid)?
                {
                    self.index.advance(&thread, &log, head.as_ref(), value.cid);
                    let record = Record::new(value, thread.clone(), log);
                    // Publish under the log lock so subscribers see chain order.
                    self.subscriptions.publish(&record);
                    break record;
                }
                if attempts >= self.config.max_head_retries {
                    return Err(ServiceError::Conflict {
                        thread,
                        log,
                        attempts,
                    });
                }
                debug!(thread = %thread, log = %log, attempts, "head moved, rebuilding record");
            }
        };

        info!(thread = %thread, log = %log, cid = %record.cid(), "record added");

        if self.config.push_on_add {
            self.push_record(ctx, &record, &settings.addrs);
        }
        Ok(record)
    }

    /// Validate and append a record produced elsewhere.
    ///
    /// The record must hash to its cid, link to the log's current head and
    /// carry a signature by the log key. A log unknown to a known thread is
    /// registered by its root record.
    pub fn put_record(
        &self,
        ctx: &Context,
        record: LogRecord,
        opts: impl IntoIterator<Item = PutOption>,
    ) -> Result<Record> {
        ctx.check()?;
        let settings = PutSettings::from_options(opts);
        let log = settings
            .log
            .ok_or_else(|| ServiceError::InvalidRecord("no target log given".into()))?;

        let cid = record.cid;
        self.accept_record(settings.thread, log, record, &[])?
            .ok_or_else(|| ServiceError::InvalidRecord(format!("record {cid} is already in log {log}")))
    }

    /// Look up a record by cid, asking the log's peers if it is not local.
    pub fn get_record(
        &self,
        ctx: &Context,
        thread: &ThreadId,
        log: &LogId,
        cid: &Cid,
    ) -> Result<Record> {
        ctx.check()?;
        let info = self.log_info(thread, log)?;
        let providers = self.remote_addrs(&info.addrs);

        let node = match self.dag.fetch(ctx, cid, &providers) {
            Ok(Some(node)) => node,
            Ok(None) => return Err(ServiceError::RecordNotFound(*cid)),
            Err(e) if e.is_context_error() => return Err(e),
            Err(e) => {
                debug!(cid = %cid, error = %e, "record lookup failed");
                return Err(ServiceError::RecordNotFound(*cid));
            }
        };

        let value = LogRecord::from_node(&node)?;
        value.verify(thread, log)?;
        Ok(Record::new(value, thread.clone(), *log))
    }

    /// A page of records strictly after `offset`, oldest first.
    ///
    /// `None` starts from the root of the log. Pass the cid of the last
    /// record of a page to get the next one. Only the records of the page
    /// are loaded once the log is indexed.
    pub fn pull(
        &self,
        ctx: &Context,
        thread: &ThreadId,
        log: &LogId,
        offset: Option<&Cid>,
        opts: impl IntoIterator<Item = PullOption>,
    ) -> Result<Vec<Record>> {
        ctx.check()?;
        let settings = PullSettings::from_options(opts);
        let limit = settings.limit.unwrap_or(self.config.page_size);
        let info = self.log_info(thread, log)?;

        let page = self
            .index
            .page(thread, log, info.head, offset, limit, |cid| {
                ctx.check()?;
                Ok(self.load_record(cid)?.prev)
            })?;
        let page = match (page, offset) {
            (Some(page), _) => page,
            (None, Some(offset)) => return Err(ServiceError::RecordNotFound(*offset)),
            (None, None) => Vec::new(),
        };

        page.iter()
            .map(|cid| {
                ctx.check()?;
                Ok(Record::new(self.load_record(cid)?, thread.clone(), *log))
            })
            .collect()
    }

    /// Decrypt a record body with `key`, or with its log's read key.
    pub fn open_record(&self, record: &Record, key: Option<&EncryptionKey>) -> Result<Vec<u8>> {
        if let Some(key) = key {
            return record.value().decrypt(key);
        }
        let info = self.log_info(record.thread_id(), &record.log_id())?;
        let key = info.read_key.ok_or_else(|| {
            ServiceError::PermissionDenied(format!("no read key for log {}", info.id))
        })?;
        record.value().decrypt(&key)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe to records observed from now on.
    pub fn subscribe(&self, opts: impl IntoIterator<Item = ListenOption>) -> Subscription {
        self.subscriptions
            .subscribe(ListenSettings::from_options(opts))
    }

    /// Close every open subscription.
    pub fn close(&self) {
        self.subscriptions.close_all();
        debug!("subscriptions closed");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn log_lock(&self, thread: &ThreadId, log: &LogId) -> Arc<Mutex<()>> {
        let mut locks = self.log_locks.lock();
        Arc::clone(
            locks
                .entry((thread.clone(), *log))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    fn log_info(&self, thread: &ThreadId, log: &LogId) -> Result<LogInfo> {
        self.store
            .log_info(thread, log)?
            .ok_or_else(|| ServiceError::LogNotFound {
                thread: thread.clone(),
                log: *log,
            })
    }

    fn head(&self, thread: &ThreadId, log: &LogId) -> Result<Option<Cid>> {
        Ok(self.log_info(thread, log)?.head)
    }

    /// This peer's log in `thread`, creating the thread and log if needed.
    fn own_log(&self, thread: &ThreadId) -> Result<LogInfo> {
        let id = self.log_id();
        if let Some(info) = self.store.log_info(thread, &id)? {
            return Ok(info);
        }

        match self.store.add_thread(thread) {
            Ok(()) => info!(thread = %thread, "thread created"),
            Err(ServiceError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        let mut info = LogInfo::new(id);
        info.priv_key = Some(self.identity.clone());
        info.read_key = Some(EncryptionKey::generate());
        info.addrs = self.config.listen_addrs.clone();
        if self.store.add_log(thread, info)? {
            debug!(thread = %thread, log = %id, "own log created");
        }

        self.log_info(thread, &id)
    }

    fn resolve_key(
        &self,
        thread: &ThreadId,
        settings: &AddSettings,
        own: &LogInfo,
    ) -> Result<EncryptionKey> {
        if let Some(key) = &settings.key {
            return Ok(key.clone());
        }

        let source = match &settings.key_log {
            Some(log) => self.log_info(thread, log)?,
            None => own.clone(),
        };
        source.read_key.ok_or_else(|| {
            ServiceError::PermissionDenied(format!("no read key for log {}", source.id))
        })
    }

    /// Addresses that are not this peer's own.
    fn remote_addrs(&self, addrs: &[PeerAddr]) -> Vec<PeerAddr> {
        addrs
            .iter()
            .filter(|addr| !self.config.listen_addrs.contains(addr))
            .cloned()
            .collect()
    }

    fn load_record(&self, cid: &Cid) -> Result<LogRecord> {
        let node = self
            .dag
            .get(cid)?
            .ok_or(ServiceError::RecordNotFound(*cid))?;
        LogRecord::from_node(&node)
    }

    /// Validate a record and advance the log head to it.
    ///
    /// Returns `None` when the record is already part of the log.
    fn accept_record(
        &self,
        thread: ThreadId,
        log: LogId,
        value: LogRecord,
        from: &[PeerAddr],
    ) -> Result<Option<Record>> {
        if !self.store.has_thread(&thread)? {
            return Err(ServiceError::ThreadNotFound(thread));
        }
        if let Err(e) = value.verify(&thread, &log) {
            warn!(thread = %thread, log = %log, cid = %value.cid, error = %e, "record rejected");
            return Err(e);
        }

        let record = {
            let lock = self.log_lock(&thread, &log);
            let _guard = lock.lock();

            let info = match self.store.log_info(&thread, &log)? {
                Some(info) => info,
                None => {
                    if value.prev.is_some() {
                        return Err(ServiceError::InvalidRecord(format!(
                            "log {log} is unknown and record {} is not its root",
                            value.cid
                        )));
                    }
                    let mut info = LogInfo::new(log);
                    info.addrs = from.to_vec();
                    self.store.add_log(&thread, info)?;
                    debug!(thread = %thread, log = %log, "log registered from root record");
                    self.log_info(&thread, &log)?
                }
            };

            if value.prev != info.head {
                if self.chain_contains(&thread, &log, info.head, &value.cid)? {
                    debug!(thread = %thread, log = %log, cid = %value.cid, "record already applied");
                    return Ok(None);
                }
                debug!(thread = %thread, log = %log, cid = %value.cid, "record does not extend head");
                return Err(ServiceError::InvalidRecord(format!(
                    "record {} links to {:?} but head of log {log} is {:?}",
                    value.cid, value.prev, info.head
                )));
            }

            self.dag.put(&value.to_node()?)?;

            let mut attempts = 0;
            loop {
                attempts += 1;
                if self
                    .store
                    .compare_and_set_head(&thread, &log, value.prev.as_ref(), &value.cid)?
                {
                    self.index.advance(&thread, &log, value.prev.as_ref(), value.cid);
                    break;
                }
                let head = self.head(&thread, &log)?;
                if head != value.prev {
                    return Err(ServiceError::InvalidRecord(format!(
                        "head of log {log} moved to {head:?} while accepting {}",
                        value.cid
                    )));
                }
                if attempts >= self.config.max_head_retries {
                    return Err(ServiceError::Conflict {
                        thread,
                        log,
                        attempts,
                    });
                }
            }

            if !from.is_empty() {
                self.store.add_addrs(&thread, &log, from)?;
            }
            let record = Record::new(value, thread, log);
            self.subscriptions.publish(&record);
            record
        };

        debug!(thread = %record.thread_id(), log = %record.log_id(), cid = %record.cid(), "record accepted");
        Ok(Some(record))
    }

    /// Offer a new record to the thread's other peers. Failures are logged.
    fn push_record(&self, ctx: &Context, record: &Record, extra: &[PeerAddr]) {
        let mut targets: Vec<PeerAddr> = extra.to_vec();
        match self.store.logs(record.thread_id()) {
            Ok(logs) => {
                for log in logs.iter().filter(|log| log.id != record.log_id()) {
                    targets.extend(log.addrs.iter().cloned());
                }
            }
            Err(e) => warn!(thread = %record.thread_id(), error = %e, "cannot list push targets"),
        }
        targets.sort();
        targets.dedup();

        for addr in self.remote_addrs(&targets) {
            if let Err(e) = self
                .host
                .push_record(ctx, &addr, record, &self.config.listen_addrs)
            {
                warn!(cid = %record.cid(), peer = %addr, error = %e, "record push failed");
            }
        }
    }

    /// Walk an owned log from its head, checking every record.
    fn verify_local_log(&self, ctx: &Context, thread: &ThreadId, log: &LogInfo) -> Result<()> {
        let mut cursor = log.head;
        while let Some(cid) = cursor {
            ctx.check()?;
            let value = self.load_record(&cid)?;
            value.verify(thread, &log.id)?;
            cursor = value.prev;
        }
        Ok(())
    }

    /// Fetch and apply records a peer has beyond our head of `log`.
    /// Returns the number of records applied.
    fn sync_log(&self, ctx: &Context, thread: &ThreadId, log: &LogInfo) -> Result<usize> {
        let providers = self.remote_addrs(&log.addrs);
        if providers.is_empty() {
            return Err(ServiceError::Unreachable(format!(
                "no addresses known for log {}",
                log.id
            )));
        }

        let remote_head = self.remote_head(ctx, thread, &log.id, &providers)?;
        let Some(remote_head) = remote_head else {
            return Ok(0);
        };
        if self.chain_contains(thread, &log.id, log.head, &remote_head)? {
            return Ok(0);
        }

        let mut missing = Vec::new();
        let mut cursor = Some(remote_head);
        while cursor != log.head {
            let Some(cid) = cursor else {
                return Err(ServiceError::InvalidRecord(format!(
                    "log {} on peer does not extend local head {:?}",
                    log.id, log.head
                )));
            };
            ctx.check()?;
            let node = self
                .dag
                .fetch(ctx, &cid, &providers)?
                .ok_or(ServiceError::RecordNotFound(cid))?;
            let value = LogRecord::from_node(&node)?;
            cursor = value.prev;
            missing.push(value);
        }

        // A concurrent pull or push may have applied part of the batch
        let mut applied = 0;
        for value in missing.into_iter().rev() {
            ctx.check()?;
            if self.accept_record(thread.clone(), log.id, value, &[])?.is_some() {
                applied += 1;
            }
        }

        debug!(thread = %thread, log = %log.id, applied, "log synced");
        Ok(applied)
    }

    /// Head of a log according to the first provider that answers.
    fn remote_head(
        &self,
        ctx: &Context,
        thread: &ThreadId,
        log: &LogId,
        providers: &[PeerAddr],
    ) -> Result<Option<Cid>> {
        let mut last_err = None;
        for addr in providers {
            match self.host.log_head(ctx, addr, thread, log) {
                Ok(head) => return Ok(head),
                Err(e) if e.is_context_error() => return Err(e),
                Err(e) => {
                    debug!(log = %log, peer = %addr, error = %e, "head request failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ServiceError::Unreachable(format!("log {log}"))))
    }

    /// Whether `target` is part of the log chain ending at `head`.
    fn chain_contains(
        &self,
        thread: &ThreadId,
        log: &LogId,
        head: Option<Cid>,
        target: &Cid,
    ) -> Result<bool> {
        self.index
            .contains(thread, log, head, target, |cid| Ok(self.load_record(cid)?.prev))
    }
}

impl PeerService for Threadservice {
    fn serve_thread_logs(&self, thread: &ThreadId) -> Result<Vec<LogInfo>> {
        Ok(self
            .store
            .logs(thread)?
            .iter()
            .map(LogInfo::public)
            .collect())
    }

    fn serve_log_head(&self, thread: &ThreadId, log: &LogId) -> Result<Option<Cid>> {
        self.head(thread, log)
    }

    fn serve_block(&self, cid: &Cid) -> Result<Option<Vec<u8>>> {
        Ok(self.dag.get(cid)?.map(Node::into_data))
    }

    fn receive_record(&self, record: Record, from: &[PeerAddr]) -> Result<()> {
        if record.log_id() == self.log_id() {
            debug!(cid = %record.cid(), "ignoring push of own record");
            return Ok(());
        }
        let thread = record.thread_id().clone();
        let log = record.log_id();
        self.accept_record(thread, log, record.into_value(), from)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MemoryHost;
    use crate::types::ThreadVariant;

    fn service() -> Threadservice {
        Threadservice::in_memory(
            ServiceConfig::default(),
            Identity::generate(),
            Arc::new(MemoryHost::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_add_creates_thread_and_log() {
        let svc = service();
        let ctx = Context::background();
        let thread = ThreadId::new(ThreadVariant::AccessControlled);

        let record = svc
            .add_record(&ctx, b"hello", [AddOption::Thread(thread.clone())])
            .unwrap();

        assert_eq!(record.thread_id(), &thread);
        assert_eq!(record.log_id(), svc.log_id());
        assert_eq!(record.value().prev, None);

        let logs = svc.logs(&thread).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].head, Some(record.cid()));
        assert!(logs[0].is_owned());
        assert_eq!(svc.open_record(&record, None).unwrap(), b"hello");
    }

    #[test]
    fn test_add_without_thread_mints_one() {
        let svc = service();
        let ctx = Context::background();

        let a = svc.add_record(&ctx, b"a", []).unwrap();
        let b = svc.add_record(&ctx, b"b", []).unwrap();

        assert_ne!(a.thread_id(), b.thread_id());
        assert_eq!(svc.threads().unwrap().len(), 2);
    }

    #[test]
    fn test_records_chain_to_head() {
        let svc = service();
        let ctx = Context::background();
        let thread = ThreadId::new(ThreadVariant::AccessControlled);

        let first = svc
            .add_record(&ctx, b"1", [AddOption::Thread(thread.clone())])
            .unwrap();
        let second = svc
            .add_record(&ctx, b"2", [AddOption::Thread(thread.clone())])
            .unwrap();

        assert_eq!(second.value().prev, Some(first.cid()));
        assert_eq!(svc.logs(&thread).unwrap()[0].head, Some(second.cid()));
    }

    #[test]
    fn test_explicit_key_overrides_log_key() {
        let svc = service();
        let ctx = Context::background();
        let key = EncryptionKey::generate();

        let record = svc
            .add_record(&ctx, b"secret", [AddOption::Key(key.clone())])
            .unwrap();

        assert_eq!(svc.open_record(&record, Some(&key)).unwrap(), b"secret");
        assert!(matches!(
            svc.open_record(&record, None),
            Err(ServiceError::Crypto(_))
        ));
    }

    #[test]
    fn test_key_log_uses_that_logs_read_key() {
        let svc = service();
        let ctx = Context::background();
        let thread = ThreadId::new(ThreadVariant::AccessControlled);
        svc.add_record(&ctx, b"first", [AddOption::Thread(thread.clone())])
            .unwrap();

        let record = svc
            .add_record(
                &ctx,
                b"second",
                [
                    AddOption::Thread(thread.clone()),
                    AddOption::KeyLog(svc.log_id()),
                ],
            )
            .unwrap();
        assert_eq!(svc.open_record(&record, None).unwrap(), b"second");

        let unknown = Identity::generate().log_id();
        assert!(matches!(
            svc.add_record(
                &ctx,
                b"third",
                [AddOption::Thread(thread), AddOption::KeyLog(unknown)]
            ),
            Err(ServiceError::LogNotFound { .. })
        ));
    }

    #[test]
    fn test_add_without_private_key_is_denied() {
        let svc = service();
        let ctx = Context::background();
        let thread = ThreadId::new(ThreadVariant::AccessControlled);

        svc.store.add_thread(&thread).unwrap();
        let mut info = LogInfo::new(svc.log_id());
        info.read_key = Some(EncryptionKey::generate());
        svc.store.add_log(&thread, info).unwrap();

        assert!(matches!(
            svc.add_record(&ctx, b"x", [AddOption::Thread(thread)]),
            Err(ServiceError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_cancelled_context_stops_add() {
        let svc = service();
        let (ctx, cancel) = Context::with_cancel();
        cancel.cancel();

        assert!(matches!(
            svc.add_record(&ctx, b"x", []),
            Err(ServiceError::Cancelled)
        ));
        assert!(svc.threads().unwrap().is_empty());
    }

    #[test]
    fn test_thread_addr_needs_listen_addr() {
        let svc = service();
        let ctx = Context::background();
        let record = svc.add_record(&ctx, b"x", []).unwrap();

        assert!(matches!(
            svc.thread_addr(record.thread_id()),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn test_delete_then_recreate_starts_empty() {
        let svc = service();
        let ctx = Context::background();
        let thread = ThreadId::new(ThreadVariant::AccessControlled);

        let old = svc
            .add_record(&ctx, b"old", [AddOption::Thread(thread.clone())])
            .unwrap();
        svc.delete_thread(&ctx, &thread).unwrap();

        let fresh = svc
            .add_record(&ctx, b"new", [AddOption::Thread(thread.clone())])
            .unwrap();
        assert_eq!(fresh.value().prev, None);
        assert_ne!(fresh.cid(), old.cid());
    }
}
