//! Socket listener for client sessions.
//!
//! The transport module binds the configured socket endpoint and accepts
//! connections in a background thread, handing each one with its session
//! number to a [`ConnectionHandler`] on its own thread.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod listener_tests;
#[cfg(test)]
mod test_utils;

pub(crate) use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream, SessionId};
pub(crate) use self::listener::SocketListener;
#[cfg(test)]
pub(crate) use self::test_utils::RecordingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
