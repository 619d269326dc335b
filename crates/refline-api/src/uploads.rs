//! Handlers for `/uploads` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/uploads` | Admin only. Body: bare event array or `{"events": []}` |
//! | `GET`  | `/uploads/:id` | Upload envelope + its metrics snapshot |

use std::collections::BTreeSet;

use axum::{
  Json,
  body::Bytes,
  extract::{Path, State},
  http::HeaderMap,
};
use chrono::Utc;
use refline_core::{
  event::{Event, parse_batch},
  metrics::{AggregateMetrics, MetricsSnapshot, snapshot},
  reconcile::reconcile,
  store::{ReferralStore, StoredEvent, UploadRecord},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  AppState, auth::authenticate, error::Error, identity::IdentityProvider,
};

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
  pub upload_id: String,
  /// Raw events in the batch, before deduplication.
  pub processed: u64,
  /// Referrals touched by the batch.
  pub referrals: u64,
  pub metrics:   AggregateMetrics,
}

/// `POST /uploads` — parse, merge with stored history, reconcile, persist.
///
/// The whole batch is validated up front; reconciliation itself never
/// fails on event content. Everything the upload produces is committed
/// before the response returns.
pub async fn create<S, I>(
  State(state): State<AppState<S, I>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<UploadResponse>, Error>
where
  S: ReferralStore + Clone + 'static,
  I: IdentityProvider + Clone + 'static,
{
  let auth = authenticate(&headers, &state).await?;
  auth.require_admin()?;

  let events =
    parse_batch(&body).map_err(|e| Error::InvalidInput(e.to_string()))?;

  // A referral's events may arrive split across uploads; reconcile over
  // its full retained history so the read-model comes out the same either
  // way. Prior events come first: an earlier-stored event wins a seq
  // collision.
  let touched: BTreeSet<&str> =
    events.iter().map(|e| e.referral_id.as_str()).collect();
  let mut merged: Vec<Event> = Vec::new();
  for referral_id in &touched {
    let prior = state
      .store
      .get_events(referral_id)
      .await
      .map_err(Error::store)?;
    merged.extend(prior.into_iter().map(|stored| stored.event));
  }
  merged.extend(events.iter().cloned());

  let reconciled = reconcile(&merged);
  let metrics = snapshot(&reconciled);

  let upload = UploadRecord {
    upload_id:   Uuid::new_v4().to_string(),
    received_at: Utc::now(),
    processed:   events.len() as u64,
    referrals:   reconciled.len() as u64,
  };

  // One document per retained (deduplicated) event.
  let stored: Vec<StoredEvent> = reconciled
    .values()
    .flat_map(|referral| referral.events.iter().cloned())
    .map(|event| StoredEvent {
      event,
      upload_id:   upload.upload_id.clone(),
      imported_at: upload.received_at,
    })
    .collect();
  let states: Vec<_> = reconciled.into_values().collect();

  state
    .store
    .persist_upload(&upload, &metrics, &stored, &states)
    .await
    .map_err(Error::store)?;

  tracing::info!(
    upload_id = %upload.upload_id,
    processed = upload.processed,
    referrals = upload.referrals,
    "upload ingested"
  );

  Ok(Json(UploadResponse {
    upload_id: upload.upload_id,
    processed: upload.processed,
    referrals: upload.referrals,
    metrics:   metrics.aggregate,
  }))
}

// ─── Read back ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadDetail {
  pub upload:  UploadRecord,
  pub metrics: MetricsSnapshot,
}

/// `GET /uploads/:id` — the persisted envelope/snapshot pair.
pub async fn get_one<S, I>(
  State(state): State<AppState<S, I>>,
  headers: HeaderMap,
  Path(id): Path<String>,
) -> Result<Json<UploadDetail>, Error>
where
  S: ReferralStore + Clone + 'static,
  I: IdentityProvider + Clone + 'static,
{
  authenticate(&headers, &state).await?;

  let upload = state
    .store
    .get_upload(&id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("upload {id} not found")))?;
  let metrics = state
    .store
    .get_upload_metrics(&id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("upload {id} not found")))?;

  Ok(Json(UploadDetail { upload, metrics }))
}
