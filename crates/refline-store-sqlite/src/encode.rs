//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings; document bodies are
//! stored as compact JSON.

use chrono::{DateTime, Utc};
use refline_core::store::Role;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

// ─── Role ────────────────────────────────────────────────────────────────────

pub fn encode_role(role: Role) -> &'static str {
  match role {
    Role::Admin => "admin",
    Role::Viewer => "viewer",
  }
}

pub fn decode_role(s: &str) -> Result<Role> {
  match s {
    "admin" => Ok(Role::Admin),
    "viewer" => Ok(Role::Viewer),
    other => Err(Error::UnknownRole(other.to_owned())),
  }
}
