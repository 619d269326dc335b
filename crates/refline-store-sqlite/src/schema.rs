//! SQL schema for the Refline SQLite store.
//!
//! One table per document collection. Documents are stored as JSON bodies
//! next to the columns the read paths filter and order on.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One envelope per ingest.
CREATE TABLE IF NOT EXISTS uploads (
    upload_id   TEXT PRIMARY KEY,
    received_at TEXT NOT NULL,    -- ISO 8601 UTC
    body_json   TEXT NOT NULL     -- serialized UploadRecord
);

-- Metrics snapshot persisted with each upload.
CREATE TABLE IF NOT EXISTS upload_metrics (
    upload_id TEXT PRIMARY KEY,
    body_json TEXT NOT NULL       -- serialized MetricsSnapshot
);

-- Referral read-models. Fully overwritten by every ingest that touches
-- the referral; never partially updated.
CREATE TABLE IF NOT EXISTS referrals (
    referral_id TEXT PRIMARY KEY,
    updated_at  TEXT NOT NULL,
    body_json   TEXT NOT NULL     -- serialized ReferralState
);

-- Raw retained events, kept for audit and timeline rendering. Keyed by
-- (referral_id, seq); re-ingests replace with identical content.
CREATE TABLE IF NOT EXISTS events (
    referral_id TEXT    NOT NULL,
    seq         INTEGER NOT NULL,
    upload_id   TEXT    NOT NULL,
    imported_at TEXT    NOT NULL,
    body_json   TEXT    NOT NULL, -- serialized StoredEvent
    PRIMARY KEY (referral_id, seq)
);

-- Role lookup for the auth gate.
CREATE TABLE IF NOT EXISTS users (
    uid   TEXT PRIMARY KEY,
    email TEXT,
    role  TEXT NOT NULL           -- 'admin' | 'viewer'
);

CREATE INDEX IF NOT EXISTS events_upload_idx ON events(upload_id);

PRAGMA user_version = 1;
";
