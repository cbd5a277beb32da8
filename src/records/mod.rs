//! Log records.
//!
//! A log is a chain of records, each linking to its predecessor by content
//! identifier. Records are sealed with a read key and signed by the log key.

mod chain;
mod index;
mod wrapper;

pub use chain::LogRecord;
pub use index::ChainIndex;
pub use wrapper::Record;
