//! Error types for `refline-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid upload body: {0}")]
  Json(#[from] serde_json::Error),

  #[error("event {index}: referral_id must be a non-empty string")]
  EmptyReferralId { index: usize },

  #[error("event {index}: appt_id must be a non-empty string")]
  EmptyApptId { index: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
