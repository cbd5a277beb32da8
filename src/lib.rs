//! # Threadservice
//!
//! Multi-writer, append-only threads of encrypted, content-addressed records.
//!
//! ## Core Concepts
//!
//! - **Threads**: Shared conversations identified by a [`ThreadId`]
//! - **Logs**: One signed, hash-linked chain per writer in each thread
//! - **Records**: Sealed bodies stored as immutable DAG blocks
//! - **Subscriptions**: Best-effort live feeds of newly observed records
//!
//! A [`Threadservice`] composes a [`DagStore`] (blocks), a [`Threadstore`]
//! (thread and log metadata) and a [`Host`] (other peers).
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use threadservice::{AddOption, Context, Identity, MemoryHost, ServiceConfig, Threadservice};
//!
//! let host = Arc::new(MemoryHost::new());
//! let service = Threadservice::in_memory(ServiceConfig::default(), Identity::generate(), host)?;
//! let ctx = Context::background();
//!
//! // Append to a new thread
//! let record = service.add_record(&ctx, b"hello", [])?;
//!
//! // Page through the log from the start
//! let page = service.pull(&ctx, record.thread_id(), &record.log_id(), None, [])?;
//! assert_eq!(page.len(), 1);
//! ```

pub mod config;
pub mod context;
pub mod crypto;
pub mod dag;
pub mod error;
pub mod net;
pub mod options;
pub mod records;
pub mod service;
pub mod subscriptions;
pub mod threadstore;
pub mod types;

// Re-exports
pub use config::ServiceConfig;
pub use context::{CancelHandle, Context};
pub use crypto::{EncryptionKey, Identity};
pub use dag::{DagStore, FileDagStore, MemoryDagStore, Node};
pub use error::{LogFailure, PullFailure, Result, ServiceError};
pub use net::{Host, MemoryHost, NetworkDag, PeerService};
pub use options::{
    AddOption, AddSettings, ListenOption, ListenSettings, PullOption, PullSettings, PutOption,
    PutSettings,
};
pub use records::{LogRecord, Record};
pub use service::{PullSummary, Threadservice};
pub use subscriptions::{Subscription, SubscriptionId, SubscriptionManager};
pub use threadstore::{FileThreadstore, MemoryThreadstore, Threadstore};
pub use types::*;
