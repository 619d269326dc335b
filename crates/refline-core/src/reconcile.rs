//! The reconciliation engine.
//!
//! `reconcile` turns an unordered multiset of feed events into the current
//! state of every referral it mentions. It is a pure function: the same
//! input multiset produces byte-identical output regardless of delivery
//! order or retry topology. Anomalies in the feed (duplicates, sequence
//! gaps, writes after a terminal status) are not errors; they are counted
//! in per-referral quality metrics and otherwise resolved deterministically.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, EventPayload, ReferralStatus};

// ─── Reconciled state ────────────────────────────────────────────────────────

/// A scheduled appointment for a referral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
  pub appt_id:    String,
  pub start_time: DateTime<Utc>,
}

/// Per-referral feed-anomaly counters.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
  pub duplicates:         u64,
  pub seq_gaps:           u64,
  pub terminal_overrides: u64,
  pub reschedules:        u64,
  pub cancelled_appts:    u64,
}

/// The reconciled view of one referral.
///
/// `appointments` maps `appt_id` to its latest value, where `None` marks a
/// cancellation — distinct from the id never having been seen. `events` is
/// the deduplicated, `seq`-ascending sequence that was actually applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralState {
  pub referral_id:        String,
  pub status:             ReferralStatus,
  pub active_appointment: Option<Appointment>,
  pub appointments:       BTreeMap<String, Option<Appointment>>,
  pub events:             Vec<Event>,
  pub metrics:            QualityMetrics,
}

/// Output of the engine: `referral_id → ReferralState`, deterministically
/// ordered.
pub type ReconciledMap = BTreeMap<String, ReferralState>;

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Reconcile a batch of events into the current state of every referral.
///
/// Each referral is reconciled independently: group by `referral_id`,
/// drop duplicate `seq`s (first occurrence wins), replay the survivors in
/// ascending `seq`, then derive the active appointment.
pub fn reconcile(events: &[Event]) -> ReconciledMap {
  let mut groups: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
  for event in events {
    groups.entry(&event.referral_id).or_default().push(event);
  }

  groups
    .into_iter()
    .map(|(id, group)| (id.to_owned(), reconcile_referral(id, &group)))
    .collect()
}

fn reconcile_referral(referral_id: &str, group: &[&Event]) -> ReferralState {
  let mut metrics = QualityMetrics::default();

  // Dedup by seq, keeping the first occurrence in delivery order.
  let mut by_seq: BTreeMap<u64, &Event> = BTreeMap::new();
  for event in group {
    if by_seq.contains_key(&event.seq) {
      metrics.duplicates += 1;
    } else {
      by_seq.insert(event.seq, event);
    }
  }

  // Gaps between consecutive retained seqs. Gaps before the first retained
  // seq or after the last are unknowable and not counted.
  let mut prev: Option<u64> = None;
  for &seq in by_seq.keys() {
    if let Some(prev) = prev {
      metrics.seq_gaps += seq - prev - 1;
    }
    prev = Some(seq);
  }

  let mut reducer = ReferralReducer::new(metrics);
  for event in by_seq.values() {
    reducer.apply(&event.payload);
  }

  let events = by_seq.into_values().cloned().collect();
  reducer.finish(referral_id, events)
}

// ─── Reducer ─────────────────────────────────────────────────────────────────

/// Replay state for a single referral. Owned by one reconciliation pass;
/// nothing is shared across referrals.
struct ReferralReducer {
  status:       ReferralStatus,
  terminal:     bool,
  appointments: BTreeMap<String, Option<Appointment>>,
  metrics:      QualityMetrics,
}

impl ReferralReducer {
  fn new(metrics: QualityMetrics) -> Self {
    Self {
      status: ReferralStatus::Created,
      terminal: false,
      appointments: BTreeMap::new(),
      metrics,
    }
  }

  fn apply(&mut self, payload: &EventPayload) {
    match payload {
      EventPayload::StatusUpdate(p) => self.apply_status(p.status),
      EventPayload::AppointmentSet(p) => {
        self.apply_set(&p.appt_id, p.start_time)
      }
      EventPayload::AppointmentCancelled(p) => self.apply_cancel(&p.appt_id),
    }
  }

  fn apply_status(&mut self, status: ReferralStatus) {
    if !self.terminal {
      self.status = status;
      self.terminal = status.is_terminal();
    } else if status.is_terminal() {
      // Terminal-to-terminal transitions are allowed but counted.
      self.status = status;
      self.metrics.terminal_overrides += 1;
    }
    // Terminal-to-non-terminal: absorbed, no state or counter change.
  }

  fn apply_set(&mut self, appt_id: &str, start_time: DateTime<Utc>) {
    // A reschedule is a new time for a currently non-cancelled appointment.
    // A set after cancellation resurrects the id without counting one; the
    // cancelled marker does not remember the pre-cancellation time.
    if let Some(Some(existing)) = self.appointments.get(appt_id)
      && existing.start_time != start_time
    {
      self.metrics.reschedules += 1;
    }
    self.appointments.insert(
      appt_id.to_owned(),
      Some(Appointment { appt_id: appt_id.to_owned(), start_time }),
    );
  }

  fn apply_cancel(&mut self, appt_id: &str) {
    // Cancelling an unknown or already-cancelled appointment is a no-op.
    if let Some(slot) = self.appointments.get_mut(appt_id)
      && slot.is_some()
    {
      *slot = None;
      self.metrics.cancelled_appts += 1;
    }
  }

  fn finish(self, referral_id: &str, events: Vec<Event>) -> ReferralState {
    // The active appointment is the earliest-by-start_time non-cancelled
    // one, appt_id as tiebreak. Terminal referrals have none.
    let active_appointment = if self.terminal {
      None
    } else {
      self
        .appointments
        .values()
        .flatten()
        .min_by(|a, b| {
          a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.appt_id.cmp(&b.appt_id))
        })
        .cloned()
    };

    ReferralState {
      referral_id: referral_id.to_owned(),
      status: self.status,
      active_appointment,
      appointments: self.appointments,
      events,
      metrics: self.metrics,
    }
  }
}
