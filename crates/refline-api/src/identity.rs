//! The identity-provider capability.
//!
//! The server never sees passwords beyond proxying `/auth/login`, and never
//! verifies tokens itself: both are delegated to an injected
//! [`IdentityProvider`]. The shipped implementation is a thin HTTP adapter;
//! tests inject a static in-memory one.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::IdentityConfig;

// ─── Types ───────────────────────────────────────────────────────────────────

/// The verified subject behind a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
  pub uid:   String,
  pub email: Option<String>,
}

/// What a successful sign-in returns to the client, verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEnvelope {
  pub token: String,
  pub uid:   String,
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expires_in: Option<u64>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
  #[error("invalid credentials")]
  InvalidCredentials,

  #[error("invalid or expired token")]
  InvalidToken,

  #[error("identity provider failure: {0}")]
  Upstream(String),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the external identity provider.
///
/// All methods return `Send` futures so the trait can be used from axum
/// handlers on a multi-threaded runtime.
pub trait IdentityProvider: Send + Sync {
  /// Exchange credentials for a token envelope.
  fn sign_in<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<TokenEnvelope, IdentityError>> + Send + 'a;

  /// Verify a bearer token and return the principal it belongs to.
  fn verify_token<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Principal, IdentityError>> + Send + 'a;
}

// ─── HTTP adapter ────────────────────────────────────────────────────────────

/// [`IdentityProvider`] backed by a remote identity service over HTTP.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based. The remote
/// wire contract is provider configuration; this adapter only assumes
/// `POST {base}/v1/sessions` and `POST {base}/v1/verify`.
#[derive(Clone)]
pub struct HttpIdentityProvider {
  client:   reqwest::Client,
  base_url: String,
  api_key:  Option<String>,
}

impl HttpIdentityProvider {
  pub fn new(config: &IdentityConfig) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()?;
    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
      api_key: config.api_key.clone(),
    })
  }

  fn post(&self, path: &str) -> reqwest::RequestBuilder {
    let req = self.client.post(format!("{}{path}", self.base_url));
    match &self.api_key {
      Some(key) => req.header("x-api-key", key),
      None => req,
    }
  }
}

fn upstream(e: reqwest::Error) -> IdentityError {
  IdentityError::Upstream(e.to_string())
}

impl IdentityProvider for HttpIdentityProvider {
  async fn sign_in(
    &self,
    email: &str,
    password: &str,
  ) -> Result<TokenEnvelope, IdentityError> {
    let resp = self
      .post("/v1/sessions")
      .json(&json!({ "email": email, "password": password }))
      .send()
      .await
      .map_err(upstream)?;

    match resp.status() {
      s if s.is_success() => resp.json().await.map_err(upstream),
      reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
        Err(IdentityError::InvalidCredentials)
      }
      s => Err(IdentityError::Upstream(format!("sign-in returned {s}"))),
    }
  }

  async fn verify_token(&self, token: &str) -> Result<Principal, IdentityError> {
    let resp = self
      .post("/v1/verify")
      .json(&json!({ "token": token }))
      .send()
      .await
      .map_err(upstream)?;

    match resp.status() {
      s if s.is_success() => resp.json().await.map_err(upstream),
      reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
        Err(IdentityError::InvalidToken)
      }
      s => Err(IdentityError::Upstream(format!("verify returned {s}"))),
    }
  }
}
