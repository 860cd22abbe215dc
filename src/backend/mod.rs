//! Backend Module
//!
//! All server-side code: an Axum server whose single WebSocket endpoint
//! carries the chat event protocol.
//!
//! # Architecture
//!
//! - **`server`** - Configuration, application state, initialization
//! - **`routes`** - WebSocket upgrade, media files, health check
//! - **`realtime`** - Connection-group registry and per-socket session gateway
//! - **`commands`** - Command router from decoded events to engine calls
//! - **`messaging`** - Friendship and messaging engines
//! - **`media`** - Attachment storage, transcoding and derived metadata
//! - **`store`** - Persistence trait with PostgreSQL and in-memory backends
//! - **`auth`** - JWT verification and identity resolution
//! - **`error`** - Backend-specific error types
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs          - Module exports and documentation
//! ├── server/         - Server initialization and state
//! ├── routes/         - Route configuration
//! ├── realtime/       - Registry and session gateway
//! ├── commands/       - Command router
//! ├── messaging/      - Friendship and messaging engines
//! ├── media/          - Media pipeline
//! ├── store/          - Persistence
//! ├── auth/           - Authentication
//! └── error/          - Error types
//! ```
//!
//! # Request Flow
//!
//! A socket is authenticated at upgrade time and handed to the gateway. Each
//! text frame is decoded into a `ClientEvent`, routed to an engine, and the
//! resulting dispatches are published to the registry groups of the users
//! they address.

/// Server setup and configuration
pub mod server;

/// Route configuration
pub mod routes;

/// Real-time delivery
pub mod realtime;

/// Command routing
pub mod commands;

/// Friendship and messaging engines
pub mod messaging;

/// Attachment storage and derived metadata
pub mod media;

/// Persistence
pub mod store;

/// Backend error types
pub mod error;

/// Authentication
pub mod auth;

pub use error::BackendError;
pub use server::create_app;
