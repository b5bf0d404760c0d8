#![deny(missing_docs)]
//! Ferret bot library.
//!
//! Chat command routing, reply rate limiting, whitelist management and
//! connection health monitoring for a websocket chat room.

/// Access control list with file persistence
pub mod access_list;
/// Command routing, dispatch loop and heartbeat
pub mod bot;
/// Runtime settings
pub mod config;
/// Image lookup client
pub mod image_api;
/// Cooldown gates
pub mod rate_limit;
/// Runtime entrypoint
pub mod runner;
/// Chat transport contract and websocket implementation
pub mod transport;
/// Utility functions
pub mod utils;
