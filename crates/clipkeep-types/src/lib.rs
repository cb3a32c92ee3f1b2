//! Types shared between the clipkeep server, its client and its watcher.
//!
//! The crate owns three wire formats:
//!
//! - [`channel`]: the length-prefixed binary frames exchanged with the
//!   clipboard watcher process over its standard streams.
//! - [`records`]: the integrity-checked item record file used for history
//!   persistence and tab export/import.
//! - [`session`]: the JSONL request and response envelopes spoken on the
//!   client socket.
//!
//! All three carry clipboard content as [`MimeData`].

pub mod channel;
mod codec;
mod mime;
pub mod records;
pub mod session;

pub use codec::CodecError;
pub use mime::{MimeData, Source, SourceParseError, TEXT_PLAIN};
