//! Behavioural suites for the clipboard history server.

mod bootstrap_behaviour;
mod support;
