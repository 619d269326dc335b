//! Handlers for `/referrals` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/referrals` | Read-models, ascending by id, capped at 100 |
//! | `GET`  | `/referrals/:id` | One read-model with its full event history |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::HeaderMap,
};
use refline_core::{reconcile::ReferralState, store::ReferralStore};
use serde::{Deserialize, Serialize};

use crate::{
  AppState, auth::authenticate, error::Error, identity::IdentityProvider,
};

/// Hard cap on list responses regardless of the requested limit.
const MAX_LIST: usize = 100;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ReferralsResponse {
  pub referrals: Vec<ReferralState>,
}

/// `GET /referrals[?limit=N]`
pub async fn list<S, I>(
  State(state): State<AppState<S, I>>,
  headers: HeaderMap,
  Query(params): Query<ListParams>,
) -> Result<Json<ReferralsResponse>, Error>
where
  S: ReferralStore + Clone + 'static,
  I: IdentityProvider + Clone + 'static,
{
  authenticate(&headers, &state).await?;

  let limit = params.limit.unwrap_or(MAX_LIST).min(MAX_LIST);
  let referrals =
    state.store.list_referrals(limit).await.map_err(Error::store)?;
  Ok(Json(ReferralsResponse { referrals }))
}

// ─── Detail ───────────────────────────────────────────────────────────────────

/// `GET /referrals/:id` — the read-model, with `events` replaced by the
/// referral's full retained history (ascending `seq`, across every upload
/// that ever mentioned it).
pub async fn get_one<S, I>(
  State(state): State<AppState<S, I>>,
  headers: HeaderMap,
  Path(id): Path<String>,
) -> Result<Json<ReferralState>, Error>
where
  S: ReferralStore + Clone + 'static,
  I: IdentityProvider + Clone + 'static,
{
  authenticate(&headers, &state).await?;

  let mut referral = state
    .store
    .get_referral(&id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::NotFound(format!("referral {id} not found")))?;

  let history = state.store.get_events(&id).await.map_err(Error::store)?;
  referral.events = history.into_iter().map(|stored| stored.event).collect();

  Ok(Json(referral))
}
