//! HTTP surface for Refline.
//!
//! Exposes an axum [`Router`] over any
//! [`ReferralStore`](refline_core::store::ReferralStore) and
//! [`IdentityProvider`](identity::IdentityProvider). Ingest is admin-only;
//! reads require any authenticated caller; `/health` and `/auth/login` are
//! public.

pub mod auth;
pub mod error;
pub mod identity;
pub mod referrals;
pub mod session;
pub mod uploads;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Json, Router,
  extract::State,
  http::Method,
  routing::{get, post},
};
pub use error::Error;
use identity::IdentityProvider;
use refline_core::store::ReferralStore;
use serde::{Deserialize, Serialize};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::TraceLayer,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Which environment the server believes it is running in. Surfaced by
/// `/health`; nothing else branches on it.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
  #[default]
  Development,
  Production,
  Test,
}

/// Connection settings for the remote identity service. The wire contract
/// behind `base_url` is provider-specific and opaque to the rest of the
/// server.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
  pub base_url: String,
  #[serde(default)]
  pub api_key:  Option<String>,
}

fn default_host() -> String {
  "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
  8080
}

fn default_store_path() -> PathBuf {
  PathBuf::from("refline.db")
}

/// Runtime server configuration, deserialised from `config.toml` plus
/// `REFLINE_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default)]
  pub mode:       RunMode,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  pub identity:   IdentityConfig,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S, I> {
  pub store:    Arc<S>,
  pub identity: Arc<I>,
  pub config:   Arc<ServerConfig>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the Refline API.
pub fn router<S, I>(state: AppState<S, I>) -> Router
where
  S: ReferralStore + Clone + 'static,
  I: IdentityProvider + Clone + 'static,
{
  Router::new()
    .route("/health", get(health::<S, I>))
    .route("/auth/login", post(session::login::<S, I>))
    .route("/auth/me", get(session::me::<S, I>))
    .route("/uploads", post(uploads::create::<S, I>))
    .route("/uploads/{id}", get(uploads::get_one::<S, I>))
    .route("/referrals", get(referrals::list::<S, I>))
    .route("/referrals/{id}", get(referrals::get_one::<S, I>))
    .with_state(state)
    .layer(TraceLayer::new_for_http())
    .layer(cors())
}

fn cors() -> CorsLayer {
  CorsLayer::new()
    .allow_origin(Any)
    .allow_methods([Method::GET, Method::POST])
    .allow_headers(Any)
}

// ─── Health ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthResponse {
  status: &'static str,
  mode:   RunMode,
}

async fn health<S, I>(
  State(state): State<AppState<S, I>>,
) -> Json<HealthResponse>
where
  S: ReferralStore + Clone + 'static,
  I: IdentityProvider + Clone + 'static,
{
  Json(HealthResponse { status: "ok", mode: state.config.mode })
}

// ─── Test helpers ────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use refline_store_sqlite::SqliteStore;
  use serde_json::Value;
  use tower::ServiceExt as _;

  use super::{
    test_helpers::{StaticIdentity, make_state},
    *,
  };

  async fn oneshot_raw(
    state: AppState<SqliteStore, StaticIdentity>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: &str,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
      builder =
        builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if !body.is_empty() {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    router(state).oneshot(req).await.unwrap()
  }

  async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn scenario_batch() -> &'static str {
    r#"[
      {"referral_id":"R1","seq":1,"type":"STATUS_UPDATE","payload":{"status":"SENT"}},
      {"referral_id":"R1","seq":2,"type":"APPOINTMENT_SET",
       "payload":{"appt_id":"A","start_time":"2025-02-01T10:00:00Z"}},
      {"referral_id":"R1","seq":3,"type":"STATUS_UPDATE","payload":{"status":"SCHEDULED"}},
      {"referral_id":"R2","seq":1,"type":"STATUS_UPDATE","payload":{"status":"SENT"}},
      {"referral_id":"R2","seq":1,"type":"STATUS_UPDATE","payload":{"status":"SENT"}},
      {"referral_id":"R2","seq":3,"type":"STATUS_UPDATE","payload":{"status":"ACKNOWLEDGED"}}
    ]"#
  }

  // ── Health ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn health_is_public() {
    let state = make_state().await;
    let resp = oneshot_raw(state, "GET", "/health", None, "").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["mode"], "test");
  }

  // ── Login ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn login_returns_token_envelope() {
    let state = make_state().await;
    let resp = oneshot_raw(
      state,
      "POST",
      "/auth/login",
      None,
      r#"{"email":"admin@example.com","password":"secret"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["token"], "admin-token");
    assert_eq!(json["uid"], "u-admin");
    assert_eq!(json["expiresIn"], 3600);
  }

  #[tokio::test]
  async fn login_rejects_bad_credentials() {
    let state = make_state().await;
    let resp = oneshot_raw(
      state,
      "POST",
      "/auth/login",
      None,
      r#"{"email":"admin@example.com","password":"wrong"}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn login_rejects_malformed_body() {
    let state = make_state().await;
    let resp =
      oneshot_raw(state, "POST", "/auth/login", None, "not json").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  // ── Me ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn me_reflects_principal_and_role() {
    let state = make_state().await;
    let resp =
      oneshot_raw(state, "GET", "/auth/me", Some("admin-token"), "").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["uid"], "u-admin");
    assert_eq!(json["email"], "u-admin@example.com");
    assert_eq!(json["role"], "admin");
  }

  #[tokio::test]
  async fn me_without_token_is_unauthorized() {
    let state = make_state().await;
    let resp = oneshot_raw(state, "GET", "/auth/me", None, "").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn unknown_token_is_unauthorized() {
    let state = make_state().await;
    let resp =
      oneshot_raw(state, "GET", "/referrals", Some("bogus"), "").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  // ── Uploads: the auth matrix ───────────────────────────────────────────

  #[tokio::test]
  async fn upload_without_token_is_unauthorized() {
    let state = make_state().await;
    let resp =
      oneshot_raw(state, "POST", "/uploads", None, scenario_batch()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn upload_as_viewer_is_forbidden() {
    let state = make_state().await;
    let resp = oneshot_raw(
      state,
      "POST",
      "/uploads",
      Some("viewer-token"),
      scenario_batch(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn subject_without_user_document_defaults_to_viewer() {
    let state = make_state().await;

    let read = oneshot_raw(
      state.clone(),
      "GET",
      "/referrals",
      Some("ghost-token"),
      "",
    )
    .await;
    assert_eq!(read.status(), StatusCode::OK);

    let write = oneshot_raw(
      state,
      "POST",
      "/uploads",
      Some("ghost-token"),
      scenario_batch(),
    )
    .await;
    assert_eq!(write.status(), StatusCode::FORBIDDEN);
  }

  // ── Uploads: ingest ────────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_upload_reports_counts_and_metrics() {
    let state = make_state().await;
    let resp = oneshot_raw(
      state,
      "POST",
      "/uploads",
      Some("admin-token"),
      scenario_batch(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert!(!json["uploadId"].as_str().unwrap().is_empty());
    assert_eq!(json["processed"], 6);
    assert_eq!(json["referrals"], 2);
    assert_eq!(json["metrics"]["total"], 2);
    assert_eq!(json["metrics"]["inProgress"], 2);
    assert_eq!(json["metrics"]["scheduled"], 1);
    assert_eq!(json["metrics"]["noAppointment"], 1);
  }

  #[tokio::test]
  async fn upload_accepts_wrapped_events_object() {
    let state = make_state().await;
    let body = format!(r#"{{"events":{}}}"#, scenario_batch());
    let resp =
      oneshot_raw(state, "POST", "/uploads", Some("admin-token"), &body)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn upload_rejects_unknown_event_type() {
    let state = make_state().await;
    let body = r#"[{"referral_id":"R1","seq":1,"type":"REFERRAL_MERGED","payload":{}}]"#;
    let resp =
      oneshot_raw(state, "POST", "/uploads", Some("admin-token"), body).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn upload_rejects_malformed_json() {
    let state = make_state().await;
    let resp =
      oneshot_raw(state, "POST", "/uploads", Some("admin-token"), "{")
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  // ── Reads after ingest ─────────────────────────────────────────────────

  #[tokio::test]
  async fn uploaded_state_is_visible_to_viewers() {
    let state = make_state().await;
    oneshot_raw(
      state.clone(),
      "POST",
      "/uploads",
      Some("admin-token"),
      scenario_batch(),
    )
    .await;

    let list = oneshot_raw(
      state.clone(),
      "GET",
      "/referrals",
      Some("viewer-token"),
      "",
    )
    .await;
    assert_eq!(list.status(), StatusCode::OK);
    let json = body_json(list).await;
    let referrals = json["referrals"].as_array().unwrap();
    assert_eq!(referrals.len(), 2);
    assert_eq!(referrals[0]["referral_id"], "R1");

    let detail = oneshot_raw(
      state,
      "GET",
      "/referrals/R2",
      Some("viewer-token"),
      "",
    )
    .await;
    assert_eq!(detail.status(), StatusCode::OK);
    let json = body_json(detail).await;
    assert_eq!(json["status"], "ACKNOWLEDGED");
    assert_eq!(json["metrics"]["duplicates"], 1);
    assert_eq!(json["metrics"]["seqGaps"], 1);
    assert_eq!(json["active_appointment"], Value::Null);
  }

  #[tokio::test]
  async fn referral_detail_merges_history_across_uploads() {
    let state = make_state().await;
    oneshot_raw(
      state.clone(),
      "POST",
      "/uploads",
      Some("admin-token"),
      r#"[{"referral_id":"R1","seq":2,"type":"STATUS_UPDATE","payload":{"status":"SENT"}}]"#,
    )
    .await;
    oneshot_raw(
      state.clone(),
      "POST",
      "/uploads",
      Some("admin-token"),
      r#"[{"referral_id":"R1","seq":1,"type":"STATUS_UPDATE","payload":{"status":"CREATED"}}]"#,
    )
    .await;

    let detail = oneshot_raw(
      state,
      "GET",
      "/referrals/R1",
      Some("viewer-token"),
      "",
    )
    .await;
    let json = body_json(detail).await;

    let seqs: Vec<u64> = json["events"]
      .as_array()
      .unwrap()
      .iter()
      .map(|e| e["seq"].as_u64().unwrap())
      .collect();
    assert_eq!(seqs, vec![1, 2]);

    // The read-model is recomputed over the merged history: replaying
    // CREATED then SENT in seq order lands on SENT.
    assert_eq!(json["status"], "SENT");
    assert_eq!(json["metrics"]["duplicates"], 0);
    assert_eq!(json["metrics"]["seqGaps"], 0);
  }

  #[tokio::test]
  async fn unknown_referral_is_not_found() {
    let state = make_state().await;
    let resp = oneshot_raw(
      state,
      "GET",
      "/referrals/nope",
      Some("viewer-token"),
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body_json(resp).await;
    assert!(json["error"].as_str().unwrap().contains("nope"));
  }

  // ── Upload read-back ───────────────────────────────────────────────────

  #[tokio::test]
  async fn upload_detail_returns_envelope_and_snapshot() {
    let state = make_state().await;
    let resp = oneshot_raw(
      state.clone(),
      "POST",
      "/uploads",
      Some("admin-token"),
      scenario_batch(),
    )
    .await;
    let upload_id =
      body_json(resp).await["uploadId"].as_str().unwrap().to_owned();

    let detail = oneshot_raw(
      state,
      "GET",
      &format!("/uploads/{upload_id}"),
      Some("viewer-token"),
      "",
    )
    .await;
    assert_eq!(detail.status(), StatusCode::OK);

    let json = body_json(detail).await;
    assert_eq!(json["upload"]["uploadId"], upload_id.as_str());
    assert_eq!(json["metrics"]["aggregate"]["total"], 2);
    // R2 carried one duplicate and one gap: it tops the quality ranking.
    assert_eq!(
      json["metrics"]["quality"]["worst"][0]["referral_id"],
      "R2"
    );
  }

  #[tokio::test]
  async fn unknown_upload_is_not_found() {
    let state = make_state().await;
    let resp = oneshot_raw(
      state,
      "GET",
      "/uploads/nope",
      Some("viewer-token"),
      "",
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }
}
