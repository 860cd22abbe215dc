//! Identity resolution for socket upgrades

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use tracing::debug;

use super::sessions::{verify_token, TokenKeys};
use crate::backend::error::BackendError;
use crate::backend::store::Store;
use crate::shared::messaging::User;

/// The authenticated user behind a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
        }
    }
}

/// Maps upgrade credentials to an identity
#[async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    /// # Returns
    ///
    /// * `Ok(Identity)` - the token is valid and names an existing user
    /// * `Err(BackendError::Unauthorized)` - anything else
    async fn resolve(&self, token: Option<&str>) -> Result<Identity, BackendError>;
}

/// Verifies JWTs and checks the subject exists in the store
pub struct JwtIdentityResolver {
    keys: TokenKeys,
    store: Arc<dyn Store>,
}

impl JwtIdentityResolver {
    pub fn new(keys: TokenKeys, store: Arc<dyn Store>) -> Self {
        Self { keys, store }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: Option<&str>) -> Result<Identity, BackendError> {
        let token = token.ok_or_else(|| BackendError::unauthorized("missing token"))?;
        let claims = verify_token(&self.keys, token).map_err(|e| {
            debug!("[Auth] Token rejected: {}", e);
            BackendError::unauthorized("invalid token")
        })?;
        let user = self
            .store
            .get_user(&claims.sub)
            .await?
            .ok_or_else(|| BackendError::unauthorized("unknown user"))?;
        Ok(Identity::from(&user))
    }
}

/// Token from `?token=` or an `Authorization: Bearer` header, query first
pub fn token_from_request<'a>(query: Option<&'a str>, headers: &'a HeaderMap) -> Option<&'a str> {
    query.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    })
}
