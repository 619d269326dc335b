//! Bearer-token extraction and the per-request auth gate.
//!
//! Token verification is delegated to the injected
//! [`IdentityProvider`](crate::identity::IdentityProvider); the role comes
//! from the store's `users/{uid}` collection. A verified subject with no
//! user document is a plain viewer.

use axum::http::{HeaderMap, header};
use refline_core::store::{ReferralStore, Role};

use crate::{AppState, error::Error, identity::IdentityProvider};

/// The authenticated caller attached to a request.
#[derive(Debug, Clone)]
pub struct AuthContext {
  pub uid:   String,
  pub email: Option<String>,
  pub role:  Role,
}

impl AuthContext {
  pub fn require_admin(&self) -> Result<(), Error> {
    if self.role.is_admin() { Ok(()) } else { Err(Error::Forbidden) }
  }
}

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)?
    .to_str()
    .ok()?
    .strip_prefix("Bearer ")
}

/// Verify the request's bearer token and resolve the caller's role.
pub async fn authenticate<S, I>(
  headers: &HeaderMap,
  state: &AppState<S, I>,
) -> Result<AuthContext, Error>
where
  S: ReferralStore,
  I: IdentityProvider,
{
  let token = bearer_token(headers).ok_or(Error::Unauthorized)?;
  let principal = state.identity.verify_token(token).await?;

  let role = state
    .store
    .get_user(&principal.uid)
    .await
    .map_err(Error::store)?
    .map(|user| user.role)
    .unwrap_or(Role::Viewer);

  Ok(AuthContext { uid: principal.uid, email: principal.email, role })
}
