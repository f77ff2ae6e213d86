//! Command-line front end for `callgate-core`.
//!
//! The binary wraps a [`callgate_core::Session`] in a [`runner::ScriptRunner`]
//! that executes statement scripts or an interactive console.

pub mod runner;

pub use runner::ScriptRunner;
