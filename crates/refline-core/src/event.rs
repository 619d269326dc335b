//! Event types — the fundamental unit of the referral feed.
//!
//! An event is an immutable record describing one mutation to a referral,
//! identified by `(referral_id, seq)`. The feed may deliver events out of
//! order, duplicated, or with sequence gaps; none of that is resolved here.
//! Parsing is the single validation point — the engine never fails on
//! event content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status of a referral. `Completed` and `Cancelled` are terminal:
/// once reached, only another terminal status may replace them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralStatus {
  Created,
  Sent,
  Acknowledged,
  Scheduled,
  Completed,
  Cancelled,
}

impl ReferralStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Cancelled)
  }
}

// ─── Payload variants ────────────────────────────────────────────────────────

/// Payload of a `STATUS_UPDATE` event.
///
/// `extra` holds feed fields this service does not interpret; they survive
/// round-trips so the audit trail keeps what the source sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
  pub status: ReferralStatus,
  #[serde(flatten)]
  pub extra:  Map<String, Value>,
}

/// Payload of an `APPOINTMENT_SET` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSetPayload {
  pub appt_id:    String,
  pub start_time: DateTime<Utc>,
  #[serde(flatten)]
  pub extra:      Map<String, Value>,
}

/// Payload of an `APPOINTMENT_CANCELLED` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentCancelledPayload {
  pub appt_id: String,
  #[serde(flatten)]
  pub extra:   Map<String, Value>,
}

/// The typed payload of an event, discriminated by the wire `type` field.
/// An unknown `type` fails deserialization, which rejects the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventPayload {
  #[serde(rename = "STATUS_UPDATE")]
  StatusUpdate(StatusUpdatePayload),
  #[serde(rename = "APPOINTMENT_SET")]
  AppointmentSet(AppointmentSetPayload),
  #[serde(rename = "APPOINTMENT_CANCELLED")]
  AppointmentCancelled(AppointmentCancelledPayload),
}

impl EventPayload {
  pub fn status(status: ReferralStatus) -> Self {
    Self::StatusUpdate(StatusUpdatePayload { status, extra: Map::new() })
  }

  pub fn appointment_set(
    appt_id: impl Into<String>,
    start_time: DateTime<Utc>,
  ) -> Self {
    Self::AppointmentSet(AppointmentSetPayload {
      appt_id: appt_id.into(),
      start_time,
      extra: Map::new(),
    })
  }

  pub fn appointment_cancelled(appt_id: impl Into<String>) -> Self {
    Self::AppointmentCancelled(AppointmentCancelledPayload {
      appt_id: appt_id.into(),
      extra:   Map::new(),
    })
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// One immutable feed record. `seq` orders events within a single referral
/// only; it is not globally monotonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub referral_id: String,
  pub seq:         u64,
  #[serde(flatten)]
  pub payload:     EventPayload,
}

impl Event {
  pub fn new(
    referral_id: impl Into<String>,
    seq: u64,
    payload: EventPayload,
  ) -> Self {
    Self { referral_id: referral_id.into(), seq, payload }
  }
}

// ─── Batch parsing ───────────────────────────────────────────────────────────

/// Both request shapes observed in the wild: a bare JSON array of events,
/// or an object wrapping them under an `events` key.
#[derive(Deserialize)]
#[serde(untagged)]
enum UploadBody {
  Bare(Vec<Event>),
  Wrapped { events: Vec<Event> },
}

/// Parse and validate a raw upload body into a batch of events.
///
/// Rejects the whole batch on malformed JSON, an unknown event `type`, a
/// missing payload field, or an empty `referral_id`/`appt_id`. Unknown
/// payload fields are retained in `extra`.
pub fn parse_batch(body: &[u8]) -> Result<Vec<Event>> {
  let events = match serde_json::from_slice::<UploadBody>(body)? {
    UploadBody::Bare(events) => events,
    UploadBody::Wrapped { events } => events,
  };

  for (index, event) in events.iter().enumerate() {
    if event.referral_id.is_empty() {
      return Err(Error::EmptyReferralId { index });
    }
    match &event.payload {
      EventPayload::AppointmentSet(p) if p.appt_id.is_empty() => {
        return Err(Error::EmptyApptId { index });
      }
      EventPayload::AppointmentCancelled(p) if p.appt_id.is_empty() => {
        return Err(Error::EmptyApptId { index });
      }
      _ => {}
    }
  }

  Ok(events)
}
