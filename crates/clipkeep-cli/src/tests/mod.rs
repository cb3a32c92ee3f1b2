//! Unit and behavioural coverage for the clipkeep client runtime.

pub(crate) mod support;
