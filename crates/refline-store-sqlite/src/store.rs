//! [`SqliteStore`] — the SQLite implementation of
//! [`ReferralStore`](refline_core::store::ReferralStore).

use std::path::Path;

use refline_core::{
  metrics::MetricsSnapshot,
  reconcile::ReferralState,
  store::{ReferralStore, StoredEvent, UploadRecord, UserRecord},
};

use crate::{
  Error, Result,
  batch::WriteBatch,
  encode::decode_role,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Refline referral store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch a single `body_json` column by key from `table`.
  async fn get_body(
    &self,
    sql: &'static str,
    key: String,
  ) -> Result<Option<String>> {
    use rusqlite::OptionalExtension as _;

    let body: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(sql, rusqlite::params![key], |row| row.get(0))
            .optional()?,
        )
      })
      .await?;
    Ok(body)
  }
}

// ─── ReferralStore impl ──────────────────────────────────────────────────────

impl ReferralStore for SqliteStore {
  type Error = Error;

  // ── Ingest ────────────────────────────────────────────────────────────

  async fn persist_upload(
    &self,
    upload: &UploadRecord,
    metrics: &MetricsSnapshot,
    events: &[StoredEvent],
    referrals: &[ReferralState],
  ) -> Result<()> {
    let mut batch = WriteBatch::new();
    batch.put_upload(upload)?;
    batch.put_upload_metrics(&upload.upload_id, metrics)?;
    for event in events {
      batch.put_event(event)?;
    }
    for state in referrals {
      batch.put_referral(state)?;
    }
    batch.commit(&self.conn).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  async fn get_referral(
    &self,
    referral_id: &str,
  ) -> Result<Option<ReferralState>> {
    let body = self
      .get_body(
        "SELECT body_json FROM referrals WHERE referral_id = ?1",
        referral_id.to_owned(),
      )
      .await?;
    body.map(|s| Ok(serde_json::from_str(&s)?)).transpose()
  }

  async fn list_referrals(&self, limit: usize) -> Result<Vec<ReferralState>> {
    let limit = limit as i64;

    let bodies: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT body_json FROM referrals ORDER BY referral_id LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    bodies
      .iter()
      .map(|s| Ok(serde_json::from_str(s)?))
      .collect()
  }

  async fn get_events(&self, referral_id: &str) -> Result<Vec<StoredEvent>> {
    let id = referral_id.to_owned();

    let bodies: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT body_json FROM events WHERE referral_id = ?1
           ORDER BY seq ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    bodies
      .iter()
      .map(|s| Ok(serde_json::from_str(s)?))
      .collect()
  }

  async fn get_upload(&self, upload_id: &str) -> Result<Option<UploadRecord>> {
    let body = self
      .get_body(
        "SELECT body_json FROM uploads WHERE upload_id = ?1",
        upload_id.to_owned(),
      )
      .await?;
    body.map(|s| Ok(serde_json::from_str(&s)?)).transpose()
  }

  async fn get_upload_metrics(
    &self,
    upload_id: &str,
  ) -> Result<Option<MetricsSnapshot>> {
    let body = self
      .get_body(
        "SELECT body_json FROM upload_metrics WHERE upload_id = ?1",
        upload_id.to_owned(),
      )
      .await?;
    body.map(|s| Ok(serde_json::from_str(&s)?)).transpose()
  }

  // ── Users ─────────────────────────────────────────────────────────────

  async fn get_user(&self, uid: &str) -> Result<Option<UserRecord>> {
    use rusqlite::OptionalExtension as _;

    let uid_owned = uid.to_owned();
    let raw: Option<(Option<String>, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT email, role FROM users WHERE uid = ?1",
              rusqlite::params![uid_owned],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|(email, role)| {
        Ok(UserRecord { uid: uid.to_owned(), email, role: decode_role(&role)? })
      })
      .transpose()
  }

  async fn put_user(&self, user: &UserRecord) -> Result<()> {
    let mut batch = WriteBatch::new();
    batch.put_user(user);
    batch.commit(&self.conn).await
  }
}
