//! Authentication Module
//!
//! Resolves the credentials presented on a socket upgrade to a user
//! identity. Login and token issuance live in a separate service; this
//! module only verifies.
//!
//! # Architecture
//!
//! - **`sessions`** - JWT claims, signing keys, token creation and verification
//! - **`identity`** - `Identity`, the `IdentityResolver` collaborator and its
//!   JWT-backed implementation
//!
//! # Authentication Flow
//!
//! 1. The client opens `/chat/` with `?token=<jwt>` or `Authorization: Bearer <jwt>`
//! 2. The token is verified and its subject looked up in the store
//! 3. On success the socket is upgraded and bound to that identity;
//!    otherwise the upgrade is refused with 403

pub mod identity;
pub mod sessions;

pub use identity::{token_from_request, Identity, IdentityResolver, JwtIdentityResolver};
pub use sessions::{create_token, verify_token, Claims, TokenKeys};
