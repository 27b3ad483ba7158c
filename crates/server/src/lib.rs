//! The Miniserver telemetry bridge: REST discovery, the WebSocket
//! handshake, live value-state ingest, and snapshot persistence, wired
//! together by [`supervisor::run`].

pub mod backup;
pub mod config;
pub mod error;
pub mod handshake;
pub mod logging;
pub mod persist;
pub mod rest;
pub mod supervisor;
pub mod transport;

pub use error::{BridgeError, Result};
