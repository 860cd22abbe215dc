//! Real-time Delivery Module
//!
//! Everything between a live socket and the engines.
//!
//! # Architecture
//!
//! - **`registry`** - `GroupRegistry`, the concurrent map from username to the
//!   outbound queues of that user's live sockets
//! - **`gateway`** - `SessionGateway`, which owns one socket for its whole
//!   life: registration, sequential inbound handling, the writer task and
//!   exactly-once teardown
//!
//! # Delivery Flow
//!
//! ```text
//! socket ──> gateway ──> CommandRouter ──> Vec<Dispatch>
//!                                              │
//!             registry.deliver() <─────────────┘
//!                   │
//!   per-socket mpsc queue ──> writer task ──> socket
//! ```

pub mod gateway;
pub mod registry;

pub use gateway::{SessionGateway, SessionState};
pub use registry::{GroupRegistry, SessionCommand, SessionId, SessionSender, DEFAULT_SEND_TIMEOUT};

use crate::shared::event::ServerEvent;

/// An event addressed to every live socket of one user
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Username whose group receives the event
    pub target: String,
    pub event: ServerEvent,
}

impl Dispatch {
    pub fn to(target: impl Into<String>, event: ServerEvent) -> Self {
        Self {
            target: target.into(),
            event,
        }
    }
}

impl GroupRegistry {
    /// Publish each dispatch to its target group
    ///
    /// # Returns
    ///
    /// Total number of socket queues reached
    pub async fn deliver(&self, dispatches: Vec<Dispatch>) -> usize {
        let mut reached = 0;
        for dispatch in dispatches {
            reached += self.publish(&dispatch.target, dispatch.event).await;
        }
        reached
    }
}
