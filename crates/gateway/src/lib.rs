//! HTTP surface of the bridge.
//!
//! Serves the remote platform's notification webhook (including the
//! subscription validation handshake), the local platform's post and command
//! hooks, and a health endpoint.

pub mod events;
pub mod logs;
pub mod server;
pub mod state;
pub mod storage;
