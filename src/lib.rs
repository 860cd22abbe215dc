//! Chatline - Real-time Messaging Backend
//!
//! Chatline keeps one persistent WebSocket per client session and turns JSON
//! commands into reads and writes against a relational store, fanning the
//! results out to every live session of the affected users.
//!
//! # Module Structure
//!
//! - **`shared`** - Domain model, payload views and the event protocol
//!
//! - **`backend`** - Everything that runs inside the server process
//!   - Connection-group registry and the per-socket session gateway
//!   - Command router and the friendship and messaging engines
//!   - Media pipeline (attachment storage, transcoding, derived metadata)
//!   - Store implementations (PostgreSQL via sqlx, in-memory)
//!   - Axum server wiring, configuration and identity resolution
//!
//! # Usage
//!
//! ```rust,no_run
//! use chatline::backend::server::{config::ServerConfig, init::create_app};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//! let app = create_app(config).await?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app.router.clone()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Delivery Model
//!
//! Each username is a group in the registry. A user with several open tabs
//! has one member per socket, and every event addressed to the user reaches
//! all of them. Delivery is best-effort: sockets that are gone are skipped
//! and nothing is queued for offline users; clients resynchronize by listing.

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
pub mod backend;
