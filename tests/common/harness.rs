//! In-process backend with socket clients

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use chatline::backend::auth::Identity;
use chatline::backend::commands::CommandRouter;
use chatline::backend::media::{FsMediaStore, MediaPipeline, Transcoder};
use chatline::backend::messaging::{BroadcastMetadataHook, FriendshipEngine, MessagingEngine};
use chatline::backend::realtime::{GroupRegistry, SessionGateway, SessionState};
use chatline::backend::store::{InMemoryStore, Store};
use chatline::shared::messaging::{MediaUrls, NewUser};
use futures_util::{stream, Stream};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::PollSender;

use super::FixedTranscoder;

pub const SITE_URL: &str = "http://chat.test";
pub const MEDIA_URL: &str = "/media/";

/// How long a client waits for a frame that should arrive
const RECV_TIMEOUT: Duration = Duration::from_secs(2);
/// How long a client waits before concluding nothing will arrive
const SILENCE: Duration = Duration::from_millis(100);

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<InMemoryStore>,
    pub registry: Arc<GroupRegistry>,
    pub media: MediaPipeline,
    pub gateway: SessionGateway,
}

impl Harness {
    /// Backend with the given users and the fixed transcoder
    pub async fn new(usernames: &[&str]) -> Self {
        Self::with_transcoder(usernames, Arc::new(FixedTranscoder)).await
    }

    pub async fn with_transcoder(usernames: &[&str], transcoder: Arc<dyn Transcoder>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        for username in usernames {
            store
                .create_user(NewUser::new(*username, *username, "tester"))
                .await
                .unwrap();
        }
        let shared: Arc<dyn Store> = store.clone();
        let urls = MediaUrls::new(SITE_URL, MEDIA_URL);
        let registry = Arc::new(GroupRegistry::new());

        let hook = BroadcastMetadataHook::new(shared.clone(), registry.clone(), urls.clone());
        let media = MediaPipeline::new(
            Arc::new(FsMediaStore::new(dir.path())),
            transcoder,
            shared.clone(),
        )
        .with_hook(Arc::new(hook));
        let router = CommandRouter::new(
            Arc::new(FriendshipEngine::new(shared.clone(), urls.clone())),
            Arc::new(MessagingEngine::new(shared, media.clone(), urls)),
        );
        let gateway = SessionGateway::new(registry.clone(), router);

        Self {
            dir,
            store,
            registry,
            media,
            gateway,
        }
    }

    /// Open a session for `username` and wait until it has joined its group
    pub async fn connect(&self, username: &str) -> Client {
        let before = self.registry.member_count(username);
        let (inbound_tx, mut inbound_rx) = mpsc::channel::<Result<Message, Infallible>>(32);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(64);

        let inbound: Pin<Box<dyn Stream<Item = Result<Message, Infallible>> + Send>> =
            Box::pin(stream::poll_fn(move |cx| inbound_rx.poll_recv(cx)));
        let gateway = self.gateway.clone();
        let identity = Identity {
            username: username.to_string(),
        };
        let task = tokio::spawn(async move {
            gateway
                .run(identity, PollSender::new(outbound_tx), inbound)
                .await
        });

        tokio::time::timeout(RECV_TIMEOUT, async {
            while self.registry.member_count(username) <= before {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("session did not join its group");

        Client {
            inbound: inbound_tx,
            outbound: outbound_rx,
            task,
        }
    }

    /// Create an accepted connection between two users
    pub async fn befriend(&self, sender: &str, receiver: &str) -> i64 {
        let (connection, _) = self
            .store
            .get_or_create_connection(sender, receiver)
            .await
            .unwrap();
        self.store.accept_connection(connection.id).await.unwrap();
        connection.id
    }

    pub fn media_path(&self, url: &str) -> std::path::PathBuf {
        let prefix = format!("{}{}", SITE_URL, MEDIA_URL);
        let reference = url.strip_prefix(&prefix).expect("not a media url");
        self.dir.path().join(reference)
    }
}

/// One socket as seen from the client side
pub struct Client {
    inbound: mpsc::Sender<Result<Message, Infallible>>,
    outbound: mpsc::Receiver<Message>,
    task: JoinHandle<SessionState>,
}

impl Client {
    /// Send a JSON command
    pub async fn send(&self, command: Value) {
        self.send_raw(&command.to_string()).await;
    }

    pub async fn send_raw(&self, text: &str) {
        self.inbound
            .send(Ok(Message::Text(text.into())))
            .await
            .expect("session gone");
    }

    pub async fn send_frame(&self, frame: Message) {
        self.inbound.send(Ok(frame)).await.expect("session gone");
    }

    /// Next text frame as `{source, data}` JSON
    pub async fn recv(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket closed");
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Next text frame, asserting its kind, returning its data
    pub async fn recv_kind(&mut self, source: &str) -> Value {
        let frame = self.recv().await;
        assert_eq!(frame["source"], source, "unexpected frame {}", frame);
        frame["data"].clone()
    }

    /// Next raw frame of any type
    pub async fn recv_frame(&mut self) -> Message {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
    }

    /// Assert no frame arrives for a short while
    pub async fn expect_silence(&mut self) {
        if let Ok(Some(frame)) = tokio::time::timeout(SILENCE, self.outbound.recv()).await {
            panic!("expected silence, got {:?}", frame);
        }
    }

    /// Close from the client side and wait for the session to end
    pub async fn close(self) -> SessionState {
        let _ = self.inbound.send(Ok(Message::Close(None))).await;
        self.task.await.unwrap()
    }
}
