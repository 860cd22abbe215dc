/**
 * Session Gateway
 *
 * Owns one authenticated socket from registration to teardown.
 *
 * # Lifecycle
 *
 * ```text
 * Connecting ──(identity resolved, joined registry)──> Authenticated
 * Authenticated ──(peer close / read error / server shutdown)──> Closed
 * ```
 *
 * Sockets whose identity cannot be resolved never reach the gateway; the
 * upgrade is refused before a session exists.
 *
 * # Tasks
 *
 * The socket is split. A writer task drains the session's outbound queue and
 * is the only place events are serialized. The reader runs inline and
 * handles frames strictly in arrival order: a frame is decoded, routed and
 * its dispatches published before the next frame is read. Publishing waits
 * on full queues, so a slow socket slows the sessions writing to it.
 *
 * A session the registry evicts for not draining its queue is closed at
 * once; its writer is aborted and any undelivered backlog is dropped with
 * the socket.
 *
 * # Teardown
 *
 * Registry membership is held by a guard that leaves the group exactly once,
 * whether the loop ends normally or the future is dropped.
 */

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::{GroupRegistry, SessionCommand, SessionId};
use crate::backend::auth::Identity;
use crate::backend::commands::CommandRouter;
use crate::backend::error::BackendError;
use crate::shared::event::{ClientEvent, DecodeError};

/// Default capacity of a session's outbound queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticated => "authenticated",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Registry membership of one session; leaves on drop
struct Membership {
    registry: Arc<GroupRegistry>,
    group: String,
    id: SessionId,
    active: bool,
}

impl Membership {
    fn join(
        registry: Arc<GroupRegistry>,
        group: &str,
        sender: mpsc::Sender<SessionCommand>,
        evicted: CancellationToken,
    ) -> Self {
        let id = registry.join_session(group, sender, evicted);
        Self {
            registry,
            group: group.to_string(),
            id,
            active: true,
        }
    }

    /// Leave the group. Returns false if already left.
    fn leave(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.registry.leave(&self.group, self.id)
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.leave();
    }
}

/// Runs socket sessions against a shared registry and router
#[derive(Clone)]
pub struct SessionGateway {
    registry: Arc<GroupRegistry>,
    router: CommandRouter,
    queue_capacity: usize,
    shutdown: CancellationToken,
}

impl SessionGateway {
    pub fn new(registry: Arc<GroupRegistry>, router: CommandRouter) -> Self {
        Self {
            registry,
            router,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Close every running session when `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Serve an upgraded axum socket
    pub async fn serve(&self, identity: Identity, socket: WebSocket) -> SessionState {
        let (sink, stream) = socket.split();
        self.run(identity, sink, stream).await
    }

    /// Run one session over any frame sink and stream
    ///
    /// # Returns
    ///
    /// The final state, always [`SessionState::Closed`]
    pub async fn run<S, R, E>(&self, identity: Identity, sink: S, mut stream: R) -> SessionState
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let mut state = SessionState::Connecting;
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let closing = self.shutdown.child_token();
        let mut membership = Membership::join(
            self.registry.clone(),
            &identity.username,
            tx.clone(),
            closing.clone(),
        );
        let session = membership.id;
        let writer = tokio::spawn(write_frames(sink, rx, session));

        state = transition(session, state, SessionState::Authenticated);
        info!("[Gateway] Session {} opened for {}", session, identity.username);

        loop {
            let frame = tokio::select! {
                _ = closing.cancelled() => {
                    debug!("[Gateway] Session {} closing", session);
                    break;
                }
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.handle_text(&identity, session, text.as_str()).await,
                Some(Ok(Message::Binary(_))) => {
                    debug!("[Gateway] Session {} ignoring binary frame", session);
                }
                Some(Ok(Message::Ping(payload))) => {
                    let queued = tokio::select! {
                        _ = closing.cancelled() => false,
                        sent = tx.send(SessionCommand::Pong(payload)) => sent.is_ok(),
                    };
                    if !queued {
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("[Gateway] Session {} read error: {}", session, e);
                    break;
                }
            }
        }

        let evicted = closing.is_cancelled() && !self.shutdown.is_cancelled();
        membership.leave();
        if evicted {
            warn!("[Gateway] Session {} evicted for not draining its queue", session);
            writer.abort();
        } else {
            let _ = tx.try_send(SessionCommand::Close);
        }
        drop(tx);
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("[Gateway] Session {} writer stopped: {}", session, e),
            Err(e) if e.is_panic() => warn!("[Gateway] Writer for session {} panicked: {}", session, e),
            Err(_) => {}
        }

        state = transition(session, state, SessionState::Closed);
        info!("[Gateway] Session {} closed for {}", session, identity.username);
        state
    }

    async fn handle_text(&self, identity: &Identity, session: SessionId, text: &str) {
        let event = match ClientEvent::decode(text) {
            Ok(event) => event,
            Err(DecodeError::UnknownKind(kind)) => {
                debug!("[Gateway] Session {} dropped unknown kind {}", session, kind);
                return;
            }
            Err(e) => {
                warn!("[Gateway] Session {} dropped malformed frame: {}", session, e);
                return;
            }
        };

        let dispatches = self.router.route(identity, event).await;
        self.registry.deliver(dispatches).await;
    }
}

fn transition(session: SessionId, from: SessionState, to: SessionState) -> SessionState {
    debug!("[Gateway] Session {} {} -> {}", session, from, to);
    to
}

/// Drain the outbound queue onto the socket until closed
async fn write_frames<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<SessionCommand>,
    session: SessionId,
) -> Result<(), BackendError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display + Send,
{
    while let Some(command) = rx.recv().await {
        let frame = match command {
            SessionCommand::Deliver(event) => match event.to_json() {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    warn!("[Gateway] Session {} could not serialize {}: {}", session, event.kind(), e);
                    continue;
                }
            },
            SessionCommand::Pong(payload) => Message::Pong(payload),
            SessionCommand::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        };
        if let Err(e) = sink.send(frame).await {
            return Err(BackendError::connection_lost(format!(
                "write to session {} failed: {}",
                session, e
            )));
        }
    }
    let _ = sink.close().await;
    Ok(())
}
