/**
 * Server Initialization
 *
 * Wires the collaborators together:
 *
 * 1. Open the store (PostgreSQL or in-memory)
 * 2. Create the media root, media store and transcoder
 * 3. Create the registry and install the `message.updated` hook
 * 4. Build the engines, the command router and the session gateway
 * 5. Start the periodic registry prune
 * 6. Build the router
 *
 * Shutdown is cooperative: [`App::shutdown`] cancels the token every session
 * and background task watches, then waits for metadata tasks to stop.
 */

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::backend::auth::{JwtIdentityResolver, TokenKeys};
use crate::backend::commands::CommandRouter;
use crate::backend::error::BackendError;
use crate::backend::media::{FfmpegTranscoder, FsMediaStore, MediaError, MediaPipeline};
use crate::backend::messaging::{BroadcastMetadataHook, FriendshipEngine, MessagingEngine};
use crate::backend::realtime::{GroupRegistry, SessionGateway};
use crate::backend::routes::create_router;
use crate::backend::server::config::{load_store, ServerConfig};
use crate::backend::server::state::AppState;
use crate::backend::store::Store;
use crate::shared::messaging::MediaUrls;

/// How often closed sessions are swept out of the registry
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// A configured application
pub struct App {
    pub router: Router<()>,
    pub state: AppState,
    shutdown: CancellationToken,
}

impl App {
    /// Close every session and stop background work
    pub async fn shutdown(&self) {
        tracing::info!("[Server] Shutting down");
        self.shutdown.cancel();
        self.state.media.shutdown().await;
    }

    /// Token cancelled by [`Self::shutdown`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Create and configure the application from `config`
///
/// # Errors
///
/// Fails if the database cannot be reached or migrated, or the media root
/// cannot be created.
pub async fn create_app(config: ServerConfig) -> Result<App, BackendError> {
    tracing::info!("[Server] Initializing chat backend");

    let store = load_store(&config).await?;
    tokio::fs::create_dir_all(&config.media_root)
        .await
        .map_err(MediaError::from)?;
    tracing::info!("[Server] Media root at {}", config.media_root.display());

    let shutdown = CancellationToken::new();
    let state = build_state(&config, store, shutdown.clone());
    spawn_prune(state.registry.clone(), shutdown.clone());

    let router = create_router(state.clone(), &config);
    tracing::info!("[Server] Router configured");

    Ok(App {
        router,
        state,
        shutdown,
    })
}

/// Assemble the application state around an already opened store
pub fn build_state(config: &ServerConfig, store: Arc<dyn Store>, shutdown: CancellationToken) -> AppState {
    let urls = MediaUrls::new(&config.site_url, &config.media_url);
    let registry = Arc::new(GroupRegistry::new().with_send_timeout(config.delivery_timeout));

    let transcoder = FfmpegTranscoder::new(
        &config.ffmpeg_bin,
        &config.ffprobe_bin,
        &config.audiowaveform_bin,
    )
    .with_timeout(config.transcode_timeout)
    .with_max_samples(config.waveform_max_samples);
    let hook = BroadcastMetadataHook::new(store.clone(), registry.clone(), urls.clone());
    let media = MediaPipeline::new(
        Arc::new(FsMediaStore::new(&config.media_root)),
        Arc::new(transcoder),
        store.clone(),
    )
    .with_hook(Arc::new(hook));

    let router = CommandRouter::new(
        Arc::new(FriendshipEngine::new(store.clone(), urls.clone())),
        Arc::new(MessagingEngine::new(store.clone(), media.clone(), urls)),
    );
    let gateway = SessionGateway::new(registry.clone(), router)
        .with_queue_capacity(config.outbound_queue_capacity)
        .with_shutdown(shutdown);
    let resolver = JwtIdentityResolver::new(TokenKeys::from_secret(&config.jwt_secret), store.clone());

    AppState {
        gateway,
        resolver: Arc::new(resolver),
        store,
        registry,
        media,
    }
}

fn spawn_prune(registry: Arc<GroupRegistry>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    registry.prune();
                    tracing::debug!("[Server] Pruned registry, {} live users", registry.group_count());
                }
            }
        }
    });
}
