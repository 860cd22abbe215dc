//! Common test utilities and helpers
//!
//! - `transcoders` - deterministic stand-ins for ffmpeg and friends
//! - `harness` - a fully wired backend over the in-memory store with
//!   in-process socket clients

pub mod harness;
pub mod transcoders;

pub use harness::*;
pub use transcoders::*;
