//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::identity::IdentityError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum Error {
  #[error("bad request: {0}")]
  InvalidInput(String),

  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden")]
  Forbidden,

  #[error("not found: {0}")]
  NotFound(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("identity provider failure: {0}")]
  Upstream(String),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

impl From<IdentityError> for Error {
  fn from(e: IdentityError) -> Self {
    match e {
      IdentityError::InvalidCredentials | IdentityError::InvalidToken => {
        Self::Unauthorized
      }
      IdentityError::Upstream(msg) => Self::Upstream(msg),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    // Upstream failures get a generic body; the details go to the log only.
    let (status, message) = match &self {
      Error::InvalidInput(m) => (StatusCode::BAD_REQUEST, m.clone()),
      Error::Unauthorized => {
        (StatusCode::UNAUTHORIZED, "unauthorized".to_owned())
      }
      Error::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_owned()),
      Error::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      Error::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned())
      }
      Error::Upstream(m) => {
        tracing::error!(error = %m, "identity provider failure");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
