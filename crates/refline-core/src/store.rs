//! The `ReferralStore` trait and the record types it persists.
//!
//! The trait is implemented by storage backends (e.g.
//! `refline-store-sqlite`). The HTTP layer depends on this abstraction,
//! not on any concrete backend.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  event::Event, metrics::MetricsSnapshot, reconcile::ReferralState,
};

// ─── Record types ────────────────────────────────────────────────────────────

/// Capability tier of an authenticated caller. Anything the role store does
/// not know defaults to `Viewer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  Viewer,
}

impl Role {
  pub fn is_admin(self) -> bool {
    matches!(self, Self::Admin)
  }
}

/// A `users/{uid}` document: the role-lookup side of the auth gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
  pub uid:   String,
  pub email: Option<String>,
  pub role:  Role,
}

/// The envelope persisted once per ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
  pub upload_id:   String,
  pub received_at: DateTime<Utc>,
  /// Raw events in the batch, before deduplication.
  pub processed:   u64,
  /// Referrals touched by the batch.
  pub referrals:   u64,
}

/// A retained event as persisted: the event itself plus which upload
/// carried it and when it was imported. Keyed by `(referral_id, seq)`;
/// re-ingests overwrite with identical content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
  #[serde(flatten)]
  pub event:       Event,
  pub upload_id:   String,
  pub imported_at: DateTime<Utc>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the referral document store.
///
/// Events are append-only in spirit (re-ingests carry identical content);
/// referral read-models are fully overwritten by every ingest that touches
/// them, so readers never see a partially-reconciled referral.
pub trait ReferralStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ingest ────────────────────────────────────────────────────────────

  /// Commit everything one upload produces: the envelope, the metrics
  /// snapshot, one document per retained event, and one read-model
  /// document per touched referral.
  fn persist_upload<'a>(
    &'a self,
    upload: &'a UploadRecord,
    metrics: &'a MetricsSnapshot,
    events: &'a [StoredEvent],
    referrals: &'a [ReferralState],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Fetch one referral read-model. Returns `None` if not found.
  fn get_referral<'a>(
    &'a self,
    referral_id: &'a str,
  ) -> impl Future<Output = Result<Option<ReferralState>, Self::Error>>
  + Send
  + 'a;

  /// List referral read-models in ascending `referral_id` order, at most
  /// `limit` of them.
  fn list_referrals(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ReferralState>, Self::Error>> + Send + '_;

  /// All retained events for a referral, ascending by `seq`, across every
  /// upload that ever mentioned it.
  fn get_events<'a>(
    &'a self,
    referral_id: &'a str,
  ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + 'a;

  /// Fetch one upload envelope.
  fn get_upload<'a>(
    &'a self,
    upload_id: &'a str,
  ) -> impl Future<Output = Result<Option<UploadRecord>, Self::Error>>
  + Send
  + 'a;

  /// Fetch the metrics snapshot persisted with an upload.
  fn get_upload_metrics<'a>(
    &'a self,
    upload_id: &'a str,
  ) -> impl Future<Output = Result<Option<MetricsSnapshot>, Self::Error>>
  + Send
  + 'a;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Role lookup for the auth gate. Returns `None` for unknown subjects.
  fn get_user<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<Option<UserRecord>, Self::Error>> + Send + 'a;

  /// Create or replace a `users/{uid}` document.
  fn put_user<'a>(
    &'a self,
    user: &'a UserRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
