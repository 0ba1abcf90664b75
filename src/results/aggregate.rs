use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use super::junit::{CaseStatus, RawResultCase};
use crate::testcase::id::CanonicalId;

pub const REASON_MAX_CHARS: usize = 140;

/// One row per canonical test case, folded from every raw result that maps to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
  pub id: CanonicalId,
  pub status: CaseStatus,
  pub elapsed_seconds: f64,
  pub reason: String,
}

/// What to do with raw results whose name and class carry no test-case id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unmapped {
  /// Leave them out of the per-id view. They still count in the raw totals.
  #[default]
  Drop,
  /// Bucket them under their uppercased test name.
  ByName,
}

pub type Aggregation = IndexMap<CanonicalId, AggregatedResult>;

/// First line of the detail, cut to `max_chars` characters with a trailing ellipsis.
pub fn reason_line(detail: &str, max_chars: usize) -> String {
  let first = detail.lines().next().unwrap_or("").trim();
  if first.chars().count() > max_chars {
    let cut: String = first.chars().take(max_chars).collect();
    format!("{cut}…")
  } else {
    first.to_string()
  }
}

fn reason_for(case: &RawResultCase, max_chars: usize) -> String {
  if case.status.is_failure() && !case.detail.is_empty() {
    reason_line(&case.detail, max_chars)
  } else {
    String::new()
  }
}

/// Merge one raw result into the current aggregate for its id.
///
/// Elapsed time always accumulates. Status and reason move to the incoming case only when its
/// priority is strictly higher, so the first of several equally bad results keeps its reason.
pub fn merge(
  existing: Option<AggregatedResult>,
  id: CanonicalId,
  incoming: &RawResultCase,
  reason_max_chars: usize,
) -> AggregatedResult {
  match existing {
    None => AggregatedResult {
      id,
      status: incoming.status,
      elapsed_seconds: incoming.elapsed_seconds,
      reason: reason_for(incoming, reason_max_chars),
    },
    Some(mut current) => {
      current.elapsed_seconds += incoming.elapsed_seconds;
      if incoming.status.priority() > current.status.priority() {
        current.status = incoming.status;
        current.reason = reason_for(incoming, reason_max_chars);
      }
      current
    }
  }
}

pub fn aggregate(cases: &[RawResultCase]) -> Aggregation {
  aggregate_with(cases, Unmapped::Drop, REASON_MAX_CHARS)
}

/// Fold raw results into an insertion-ordered map keyed by canonical id.
pub fn aggregate_with(cases: &[RawResultCase], unmapped: Unmapped, reason_max_chars: usize) -> Aggregation {
  cases.iter().fold(Aggregation::new(), |mut acc, case| {
    let id = match (CanonicalId::from_case(&case.name, &case.class_name), unmapped) {
      (Some(id), _) => id,
      (None, Unmapped::ByName) => CanonicalId::verbatim(&case.name),
      (None, Unmapped::Drop) => {
        debug!("no test-case id in {}, left out of aggregation", case.test_id());
        return acc;
      }
    };
    match acc.get_mut(&id) {
      Some(slot) => *slot = merge(Some(slot.clone()), id, case, reason_max_chars),
      None => {
        let row = merge(None, id.clone(), case, reason_max_chars);
        acc.insert(id, row);
      }
    }
    acc
  })
}
