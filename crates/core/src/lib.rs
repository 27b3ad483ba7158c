//! Framing, crypto, decompression and entity-model primitives shared by the
//! bridge binary and its data layer.
//!
//! Everything here is synchronous and allocation-only: socket I/O,
//! scheduling and persistence live in the bridge crate, which calls into
//! this one frame-by-frame.

pub mod compress;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod model;
pub mod structure;

pub use error::{Error, Result};
