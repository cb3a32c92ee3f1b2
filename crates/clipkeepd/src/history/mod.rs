//! Persistent clipboard history.
//!
//! A [`HistoryStore`] keeps one newest-first item list per tab, bounded by a
//! shared capacity. Each tab persists to its own integrity-checked file
//! under the history directory; a file that fails its check is reported and
//! the tab starts empty instead of being partially reconstructed.

mod errors;
mod persist;
mod store;

pub use errors::HistoryError;
pub use store::{CommitOutcome, DEFAULT_TAB, HistoryStore, TabLoadFailure};

pub(crate) use persist::{read_items, write_items};

pub(crate) const HISTORY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::history");
