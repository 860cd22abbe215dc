/**
 * Application State Management
 *
 * `AppState` is the axum router state. The `FromRef` implementations let
 * handlers extract only the part they need.
 *
 * # Example
 *
 * ```rust,no_run
 * use axum::extract::State;
 * use chatline::backend::realtime::SessionGateway;
 *
 * async fn handler(State(gateway): State<SessionGateway>) {
 *     let live_users = gateway.registry().group_count();
 * }
 * ```
 */

use std::sync::Arc;

use axum::extract::FromRef;

use crate::backend::auth::IdentityResolver;
use crate::backend::media::MediaPipeline;
use crate::backend::realtime::{GroupRegistry, SessionGateway};
use crate::backend::store::Store;

#[derive(Clone)]
pub struct AppState {
    /// Runs every upgraded socket
    pub gateway: SessionGateway,

    /// Resolves upgrade credentials to an identity
    pub resolver: Arc<dyn IdentityResolver>,

    pub store: Arc<dyn Store>,

    /// Shared with the gateway; exposed for health reporting and pruning
    pub registry: Arc<GroupRegistry>,

    /// Background metadata tasks, shut down with the server
    pub media: MediaPipeline,
}

impl FromRef<AppState> for SessionGateway {
    fn from_ref(state: &AppState) -> Self {
        state.gateway.clone()
    }
}

impl FromRef<AppState> for Arc<dyn IdentityResolver> {
    fn from_ref(state: &AppState) -> Self {
        state.resolver.clone()
    }
}

impl FromRef<AppState> for Arc<GroupRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}
