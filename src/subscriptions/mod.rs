//! Subscription system for live record delivery.
//!
//! Every record the service observes (authored locally, put by a peer, or
//! fetched by a pull) is offered to each subscription whose thread filter
//! matches. Delivery never blocks the writer:
//! - channels are bounded, and a full channel drops the new record
//! - discarding a subscription closes its channel
//!
//! # Example
//!
//! ```ignore
//! let sub = service.subscribe([ListenOption::Thread(thread_id)]);
//!
//! while let Ok(record) = sub.recv() {
//!     println!("{} in log {}", record.cid(), record.log_id());
//! }
//! ```

mod manager;
mod types;

pub use manager::{SubscriptionManager, DEFAULT_BUFFER_SIZE};
pub use types::{Subscription, SubscriptionId};
