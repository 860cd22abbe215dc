//! Route Configuration Module
//!
//! The HTTP surface is small: one WebSocket endpoint that carries the whole
//! event protocol, static media files and a health check. See [`router`].

/// Main router creation
pub mod router;

pub use router::create_router;
