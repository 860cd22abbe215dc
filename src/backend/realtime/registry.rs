/**
 * Connection-Group Registry
 *
 * Maps a group name (a username) to the outbound queues of every live socket
 * authenticated as that user. Publishing to a group fans an event out to all
 * of its members; publishing to an empty or unknown group is a no-op.
 *
 * # Concurrency
 *
 * Membership lives in a `DashMap`, so joins, leaves and publishes from any
 * number of session tasks proceed without a global lock. `publish` clones the
 * member senders out of the map before sending, so no shard lock is held
 * while queues are touched.
 *
 * # Delivery
 *
 * Publishing waits for room in each member's queue, so a burst larger than
 * the queue reaches a live socket in full. A member that makes no room
 * within the send timeout is treated as dead: it is removed from the group
 * and its eviction token is cancelled, which closes the socket and makes the
 * client reconnect. A member whose receiver is gone is pruned. Nothing is
 * buffered for users with no live sockets.
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::shared::event::ServerEvent;

/// Identifier of one live socket
pub type SessionId = u64;

/// How long a publish waits on a full queue before evicting the session
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Items placed on a session's outbound queue
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Serialize and write an event
    Deliver(Arc<ServerEvent>),
    /// Answer a ping
    Pong(Bytes),
    /// Send a close frame and stop writing
    Close,
}

/// Sending half of a session's outbound queue
pub type SessionSender = mpsc::Sender<SessionCommand>;

#[derive(Debug, Clone)]
struct Member {
    sender: SessionSender,
    evicted: CancellationToken,
}

/// Concurrent map of group name to live session queues
#[derive(Debug)]
pub struct GroupRegistry {
    groups: DashMap<String, HashMap<SessionId, Member>>,
    next_session: AtomicU64,
    send_timeout: Duration,
}

impl Default for GroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
            next_session: AtomicU64::new(0),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Add a session to `group`
    ///
    /// # Returns
    ///
    /// The id under which the session was registered; pass it to [`Self::leave`]
    pub fn join(&self, group: &str, sender: SessionSender) -> SessionId {
        self.join_session(group, sender, CancellationToken::new())
    }

    /// Add a session to `group`, cancelling `evicted` if it is ever dropped
    /// for not draining its queue
    pub fn join_session(&self, group: &str, sender: SessionSender, evicted: CancellationToken) -> SessionId {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(id, Member { sender, evicted });
        debug!("[Registry] Session {} joined {}", id, group);
        id
    }

    /// Remove a session from `group`. Returns whether it was a member.
    pub fn leave(&self, group: &str, id: SessionId) -> bool {
        let removed = match self.groups.get_mut(group) {
            Some(mut members) => members.remove(&id).is_some(),
            None => false,
        };
        self.groups.remove_if(group, |_, members| members.is_empty());
        if removed {
            debug!("[Registry] Session {} left {}", id, group);
        }
        removed
    }

    /// Deliver `event` to every session in `group`
    ///
    /// # Returns
    ///
    /// Number of sessions the event was queued for
    pub async fn publish(&self, group: &str, event: ServerEvent) -> usize {
        let members: Vec<(SessionId, Member)> = match self.groups.get(group) {
            Some(members) => members
                .iter()
                .map(|(id, member)| (*id, member.clone()))
                .collect(),
            None => return 0,
        };

        let event = Arc::new(event);
        let mut delivered = 0;
        for (id, member) in members {
            let command = SessionCommand::Deliver(event.clone());
            match member.sender.send_timeout(command, self.send_timeout).await {
                Ok(()) => delivered += 1,
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!(
                        "[Registry] Session {} in {} stalled on {}, evicting",
                        id,
                        group,
                        event.kind()
                    );
                    self.leave(group, id);
                    member.evicted.cancel();
                }
                Err(SendTimeoutError::Closed(_)) => {
                    debug!("[Registry] Pruning closed session {} from {}", id, group);
                    self.leave(group, id);
                }
            }
        }
        delivered
    }

    /// Live sessions in `group`
    pub fn member_count(&self, group: &str) -> usize {
        self.groups.get(group).map(|m| m.len()).unwrap_or(0)
    }

    /// Groups with at least one live session
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Drop members whose receivers have gone away
    pub fn prune(&self) {
        for mut members in self.groups.iter_mut() {
            members.retain(|_, member| !member.sender.is_closed());
        }
        self.groups.retain(|_, members| !members.is_empty());
    }
}
