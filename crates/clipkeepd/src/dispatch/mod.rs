//! JSONL session handling for client connections.
//!
//! Each connection carries one request line:
//!
//! ```json
//! {"command":"read","arguments":["text/plain","0"],"session":"oneshot"}
//! ```
//!
//! The server answers with zero or more `stream` messages followed by a
//! terminal `exit` message:
//!
//! ```json
//! {"kind":"stream","stream":"stdout","data":"hello"}
//! {"kind":"exit","status":0}
//! ```
//!
//! Interactive sessions keep the connection open after the `exit` line and
//! receive `notify` messages until either side closes it.

mod errors;
mod handler;
mod request;
mod response;

pub use self::errors::DispatchError;
pub(crate) use self::handler::SessionHandler;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
