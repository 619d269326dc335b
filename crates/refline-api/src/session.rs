//! Handlers for `/auth` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/auth/login` | Body: `{"email","password"}`; proxies to the identity provider |
//! | `GET`  | `/auth/me` | Returns the caller's `{uid, email, role}` |

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use refline_core::store::{ReferralStore, Role};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::authenticate,
  error::Error,
  identity::{IdentityProvider, TokenEnvelope},
};

// ─── Login ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub email:    String,
  pub password: String,
}

/// `POST /auth/login` — returns the provider's token envelope verbatim, or
/// 401 when the credentials are rejected.
pub async fn login<S, I>(
  State(state): State<AppState<S, I>>,
  body: Bytes,
) -> Result<Json<TokenEnvelope>, Error>
where
  S: ReferralStore + Clone + 'static,
  I: IdentityProvider + Clone + 'static,
{
  let creds: LoginBody = serde_json::from_slice(&body)
    .map_err(|e| Error::InvalidInput(e.to_string()))?;

  let envelope = state.identity.sign_in(&creds.email, &creds.password).await?;
  Ok(Json(envelope))
}

// ─── Me ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct MeResponse {
  pub uid:   String,
  pub email: Option<String>,
  pub role:  Role,
}

/// `GET /auth/me`
pub async fn me<S, I>(
  State(state): State<AppState<S, I>>,
  headers: HeaderMap,
) -> Result<Json<MeResponse>, Error>
where
  S: ReferralStore + Clone + 'static,
  I: IdentityProvider + Clone + 'static,
{
  let auth = authenticate(&headers, &state).await?;
  Ok(Json(MeResponse { uid: auth.uid, email: auth.email, role: auth.role }))
}
