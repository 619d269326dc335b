//! Derived metrics over a reconciled map — computed, never stored as a
//! source of truth. Pure functions; no I/O.

use serde::{Deserialize, Serialize};

use crate::{
  event::ReferralStatus,
  reconcile::{QualityMetrics, ReconciledMap},
};

/// How many of the worst-quality referrals the summary names.
const WORST_LIMIT: usize = 10;

// ─── Aggregate metrics ───────────────────────────────────────────────────────

/// Portfolio-level counts over a reconciled map.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
  pub total:          u64,
  pub completed:      u64,
  pub cancelled:      u64,
  pub in_progress:    u64,
  pub scheduled:      u64,
  pub no_appointment: u64,
}

pub fn aggregate_metrics(map: &ReconciledMap) -> AggregateMetrics {
  let mut m = AggregateMetrics { total: map.len() as u64, ..Default::default() };

  for state in map.values() {
    match state.status {
      ReferralStatus::Completed => m.completed += 1,
      ReferralStatus::Cancelled => m.cancelled += 1,
      _ => {
        m.in_progress += 1;
        if state.active_appointment.is_some() {
          m.scheduled += 1;
        } else {
          m.no_appointment += 1;
        }
      }
    }
  }

  m
}

// ─── Data-quality summary ────────────────────────────────────────────────────

/// One referral flagged by the quality ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityOffender {
  pub referral_id: String,
  pub score:       u64,
}

/// Feed-quality totals plus the worst offenders, ranked by
/// `duplicates + seqGaps + 2·terminalOverrides`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySummary {
  pub totals: QualityMetrics,
  pub worst:  Vec<QualityOffender>,
}

fn quality_score(m: &QualityMetrics) -> u64 {
  m.duplicates + m.seq_gaps + 2 * m.terminal_overrides
}

pub fn quality_summary(map: &ReconciledMap) -> QualitySummary {
  let mut totals = QualityMetrics::default();
  for state in map.values() {
    totals.duplicates += state.metrics.duplicates;
    totals.seq_gaps += state.metrics.seq_gaps;
    totals.terminal_overrides += state.metrics.terminal_overrides;
    totals.reschedules += state.metrics.reschedules;
    totals.cancelled_appts += state.metrics.cancelled_appts;
  }

  let mut worst: Vec<QualityOffender> = map
    .values()
    .filter_map(|state| {
      let score = quality_score(&state.metrics);
      (score > 0).then(|| QualityOffender {
        referral_id: state.referral_id.clone(),
        score,
      })
    })
    .collect();

  // Descending score; ascending referral_id on ties (the map iterates in
  // ascending id order, so the sort only needs to be stable).
  worst.sort_by(|a, b| b.score.cmp(&a.score));
  worst.truncate(WORST_LIMIT);

  QualitySummary { totals, worst }
}

// ─── Per-upload snapshot ─────────────────────────────────────────────────────

/// The metrics document persisted alongside each upload: both summarizers
/// over the same reconciled map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
  pub aggregate: AggregateMetrics,
  pub quality:   QualitySummary,
}

pub fn snapshot(map: &ReconciledMap) -> MetricsSnapshot {
  MetricsSnapshot {
    aggregate: aggregate_metrics(map),
    quality:   quality_summary(map),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    event::{Event, EventPayload, ReferralStatus::*},
    reconcile::reconcile,
  };

  fn ts(s: &str) -> chrono::DateTime<chrono::Utc> {
    s.parse().expect("test timestamp")
  }

  fn reconciled() -> ReconciledMap {
    let events = vec![
      // Completed.
      Event::new("R1", 1, EventPayload::status(Completed)),
      // Cancelled.
      Event::new("R2", 1, EventPayload::status(Cancelled)),
      // In progress with an appointment.
      Event::new("R3", 1, EventPayload::status(Scheduled)),
      Event::new(
        "R3",
        2,
        EventPayload::appointment_set("A", ts("2025-02-01T10:00:00Z")),
      ),
      // In progress without one.
      Event::new("R4", 1, EventPayload::status(Sent)),
    ];
    reconcile(&events)
  }

  #[test]
  fn aggregate_counts_partition_the_map() {
    let m = aggregate_metrics(&reconciled());
    assert_eq!(m.total, 4);
    assert_eq!(m.completed, 1);
    assert_eq!(m.cancelled, 1);
    assert_eq!(m.in_progress, 2);
    assert_eq!(m.scheduled, 1);
    assert_eq!(m.no_appointment, 1);
    assert_eq!(m.in_progress, m.scheduled + m.no_appointment);
  }

  #[test]
  fn aggregate_of_empty_map_is_zero() {
    assert_eq!(
      aggregate_metrics(&ReconciledMap::new()),
      AggregateMetrics::default()
    );
  }

  #[test]
  fn quality_totals_sum_across_referrals() {
    let events = vec![
      Event::new("R1", 1, EventPayload::status(Sent)),
      Event::new("R1", 1, EventPayload::status(Sent)),
      Event::new("R1", 4, EventPayload::status(Acknowledged)),
      Event::new("R2", 1, EventPayload::status(Cancelled)),
      Event::new("R2", 2, EventPayload::status(Completed)),
    ];
    let summary = quality_summary(&reconcile(&events));

    assert_eq!(summary.totals.duplicates, 1);
    assert_eq!(summary.totals.seq_gaps, 2);
    assert_eq!(summary.totals.terminal_overrides, 1);
  }

  #[test]
  fn worst_ranks_by_score_then_id() {
    // R1: one duplicate (score 1). R2: one terminal override (score 2).
    // R3: one gap (score 1). R4: clean (score 0, excluded).
    let events = vec![
      Event::new("R1", 1, EventPayload::status(Sent)),
      Event::new("R1", 1, EventPayload::status(Sent)),
      Event::new("R2", 1, EventPayload::status(Cancelled)),
      Event::new("R2", 2, EventPayload::status(Completed)),
      Event::new("R3", 1, EventPayload::status(Sent)),
      Event::new("R3", 3, EventPayload::status(Acknowledged)),
      Event::new("R4", 1, EventPayload::status(Sent)),
    ];
    let summary = quality_summary(&reconcile(&events));

    let ranked: Vec<(&str, u64)> = summary
      .worst
      .iter()
      .map(|o| (o.referral_id.as_str(), o.score))
      .collect();
    assert_eq!(ranked, vec![("R2", 2), ("R1", 1), ("R3", 1)]);
  }

  #[test]
  fn worst_is_capped_at_ten() {
    let mut events = Vec::new();
    for i in 0..15 {
      let id = format!("R{i:02}");
      events.push(Event::new(&id, 1, EventPayload::status(Sent)));
      events.push(Event::new(&id, 1, EventPayload::status(Sent)));
    }
    let summary = quality_summary(&reconcile(&events));
    assert_eq!(summary.worst.len(), 10);
    // Equal scores fall back to ascending referral_id.
    assert_eq!(summary.worst[0].referral_id, "R00");
    assert_eq!(summary.worst[9].referral_id, "R09");
  }

  #[test]
  fn snapshot_combines_both_summaries() {
    let map = reconciled();
    let snap = snapshot(&map);
    assert_eq!(snap.aggregate, aggregate_metrics(&map));
    assert_eq!(snap.quality, quality_summary(&map));
  }
}
