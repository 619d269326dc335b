//! Chunk-rotating batched writer.
//!
//! Callers enqueue set-document operations; `commit` splits them into
//! chunks of at most [`MAX_CHUNK_OPS`] operations, runs each chunk in its
//! own transaction, and awaits every chunk before returning. Documents are
//! JSON-encoded eagerly at enqueue time so a serialization failure
//! surfaces before anything is written.
//!
//! Chunks may land in any order; a failure can leave a prefix of chunks
//! committed. That is acceptable: event keys are content-derived and
//! read-models are fully overwritten, so a retried upload converges.

use chrono::Utc;
use refline_core::{
  metrics::MetricsSnapshot,
  reconcile::ReferralState,
  store::{StoredEvent, UploadRecord, UserRecord},
};

use crate::{Result, encode::{encode_dt, encode_role}};

/// Maximum set-document operations per committed chunk.
pub const MAX_CHUNK_OPS: usize = 400;

// ─── Encoded operations ──────────────────────────────────────────────────────

/// One set-document operation, already reduced to the column values the
/// chunk transaction will bind.
enum EncodedOp {
  Upload {
    upload_id:   String,
    received_at: String,
    body_json:   String,
  },
  UploadMetrics {
    upload_id: String,
    body_json: String,
  },
  Referral {
    referral_id: String,
    updated_at:  String,
    body_json:   String,
  },
  Event {
    referral_id: String,
    seq:         i64,
    upload_id:   String,
    imported_at: String,
    body_json:   String,
  },
  User {
    uid:   String,
    email: Option<String>,
    role:  &'static str,
  },
}

impl EncodedOp {
  fn execute(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    match self {
      Self::Upload { upload_id, received_at, body_json } => {
        conn.execute(
          "INSERT OR REPLACE INTO uploads (upload_id, received_at, body_json)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![upload_id, received_at, body_json],
        )?;
      }
      Self::UploadMetrics { upload_id, body_json } => {
        conn.execute(
          "INSERT OR REPLACE INTO upload_metrics (upload_id, body_json)
           VALUES (?1, ?2)",
          rusqlite::params![upload_id, body_json],
        )?;
      }
      Self::Referral { referral_id, updated_at, body_json } => {
        conn.execute(
          "INSERT OR REPLACE INTO referrals (referral_id, updated_at, body_json)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![referral_id, updated_at, body_json],
        )?;
      }
      Self::Event { referral_id, seq, upload_id, imported_at, body_json } => {
        conn.execute(
          "INSERT OR REPLACE INTO events
             (referral_id, seq, upload_id, imported_at, body_json)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![referral_id, seq, upload_id, imported_at, body_json],
        )?;
      }
      Self::User { uid, email, role } => {
        conn.execute(
          "INSERT OR REPLACE INTO users (uid, email, role)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![uid, email, role],
        )?;
      }
    }
    Ok(())
  }
}

// ─── WriteBatch ──────────────────────────────────────────────────────────────

/// An accumulating batch of set-document operations.
#[derive(Default)]
pub struct WriteBatch {
  ops: Vec<EncodedOp>,
}

impl WriteBatch {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.ops.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ops.is_empty()
  }

  /// How many transactions `commit` will issue.
  pub fn chunk_count(&self) -> usize {
    self.ops.len().div_ceil(MAX_CHUNK_OPS)
  }

  pub fn put_upload(&mut self, upload: &UploadRecord) -> Result<()> {
    self.ops.push(EncodedOp::Upload {
      upload_id:   upload.upload_id.clone(),
      received_at: encode_dt(upload.received_at),
      body_json:   serde_json::to_string(upload)?,
    });
    Ok(())
  }

  pub fn put_upload_metrics(
    &mut self,
    upload_id: &str,
    metrics: &MetricsSnapshot,
  ) -> Result<()> {
    self.ops.push(EncodedOp::UploadMetrics {
      upload_id: upload_id.to_owned(),
      body_json: serde_json::to_string(metrics)?,
    });
    Ok(())
  }

  pub fn put_referral(&mut self, state: &ReferralState) -> Result<()> {
    self.ops.push(EncodedOp::Referral {
      referral_id: state.referral_id.clone(),
      updated_at:  encode_dt(Utc::now()),
      body_json:   serde_json::to_string(state)?,
    });
    Ok(())
  }

  pub fn put_event(&mut self, event: &StoredEvent) -> Result<()> {
    self.ops.push(EncodedOp::Event {
      referral_id: event.event.referral_id.clone(),
      seq:         event.event.seq as i64,
      upload_id:   event.upload_id.clone(),
      imported_at: encode_dt(event.imported_at),
      body_json:   serde_json::to_string(event)?,
    });
    Ok(())
  }

  pub fn put_user(&mut self, user: &UserRecord) {
    self.ops.push(EncodedOp::User {
      uid:   user.uid.clone(),
      email: user.email.clone(),
      role:  encode_role(user.role),
    });
  }

  /// Commit all enqueued operations, at most [`MAX_CHUNK_OPS`] per
  /// transaction. All chunk commits are issued together and awaited
  /// before returning.
  pub async fn commit(self, conn: &tokio_rusqlite::Connection) -> Result<()> {
    if self.ops.is_empty() {
      return Ok(());
    }

    let total = self.ops.len();
    let mut chunks: Vec<Vec<EncodedOp>> =
      Vec::with_capacity(total.div_ceil(MAX_CHUNK_OPS));
    let mut ops = self.ops;
    while ops.len() > MAX_CHUNK_OPS {
      let rest = ops.split_off(MAX_CHUNK_OPS);
      chunks.push(ops);
      ops = rest;
    }
    chunks.push(ops);

    tracing::debug!(
      ops = total,
      chunks = chunks.len(),
      "committing write batch"
    );

    let commits = chunks.into_iter().map(|chunk| {
      conn.call(move |conn| {
        let tx = conn.transaction()?;
        for op in &chunk {
          op.execute(&tx)?;
        }
        tx.commit()?;
        Ok(())
      })
    });

    futures::future::try_join_all(commits).await?;
    Ok(())
  }
}
