use serde_json::Value;

use crate::results::aggregate::{AggregatedResult, Aggregation};
use crate::results::junit::{CaseStatus, RawResultCase, RunReport, RunTotals};
use crate::ticket::adf;

pub const SUMMARY_UNAVAILABLE: &str = "Test summary unavailable";
const TRUNCATED_MARKER: &str = "\n…(truncated)…";
const TABLE_HEADER: &str = "Test case | test status | time (s) | remarks";
const TABLE_RULE: &str = "---|---|---:|---";

/// `Pass`, `Fail` or `Skip`. Errors read as failures.
pub fn status_word(status: CaseStatus) -> &'static str {
  match status {
    CaseStatus::Passed => "Pass",
    CaseStatus::Failure | CaseStatus::Error => "Fail",
    CaseStatus::Skipped => "Skip",
  }
}

fn status_icon(status: CaseStatus) -> &'static str {
  match status {
    CaseStatus::Passed => "✅",
    CaseStatus::Failure => "❌",
    CaseStatus::Error => "⛔",
    CaseStatus::Skipped => "⏭️",
  }
}

fn totals_phrase(t: &RunTotals) -> String {
  format!(
    "{} passed, {} failed, {} errors, {} skipped, total {}.",
    t.passed, t.failures, t.errors, t.skipped, t.tests
  )
}

pub fn summary_line(issue_key: &str, totals: Option<&RunTotals>) -> String {
  match totals {
    Some(t) => format!("Unit Test Summary for {issue_key}: {}", totals_phrase(t)),
    None => SUMMARY_UNAVAILABLE.to_string(),
  }
}

/// Cut to `max_chars` characters, marking the cut.
pub fn truncate_detail(detail: &str, max_chars: usize) -> String {
  match detail.char_indices().nth(max_chars) {
    Some((byte, _)) => format!("{}{TRUNCATED_MARKER}", &detail[..byte]),
    None => detail.to_string(),
  }
}

fn sorted(agg: &Aggregation) -> Vec<&AggregatedResult> {
  let mut rows: Vec<&AggregatedResult> = agg.values().collect();
  rows.sort_by(|a, b| a.id.cmp(&b.id));
  rows
}

/// One `TC-001 = PASS` line per test case, ordered by id.
pub fn tc_lines(agg: &Aggregation, include_reason: bool) -> String {
  sorted(agg)
    .into_iter()
    .map(|row| {
      let word = status_word(row.status).to_uppercase();
      if include_reason && row.status.is_failure() && !row.reason.is_empty() {
        format!("{} = {word} - {}", row.id, row.reason)
      } else {
        format!("{} = {word}", row.id)
      }
    })
    .collect::<Vec<_>>()
    .join("\n")
}

/// The per-test-case table, preceded by the run summary.
pub fn tc_table(issue_key: &str, totals: Option<&RunTotals>, agg: &Aggregation) -> String {
  let mut lines = vec![
    summary_line(issue_key, totals),
    String::new(),
    TABLE_HEADER.to_string(),
    TABLE_RULE.to_string(),
  ];
  lines.extend(sorted(agg).into_iter().map(|row| {
    format!(
      "{} | {} | {:.3} | {}",
      row.id,
      status_word(row.status),
      row.elapsed_seconds,
      row.reason.replace('|', "\\|")
    )
  }));
  lines.join("\n")
}

/// Captured output of one runner invocation, embedded in the narrative report.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
  pub stdout: String,
  pub stderr: String,
  pub exit_code: i32,
}

/// Markdown report of one run: summary, a row per raw case, failure details and raw output.
pub fn run_report(timestamp: &str, report: &RunReport, output: &RunOutput, detail_max_chars: usize) -> String {
  let summary = report
    .totals
    .as_ref()
    .map(|t| format!("Summary: {}", totals_phrase(t)))
    .unwrap_or_else(|| SUMMARY_UNAVAILABLE.to_string());

  let per_test = if report.cases.is_empty() {
    "(no test cases found)".to_string()
  } else {
    let mut lines = vec!["| Status | Test | Time (s) |".to_string(), "|---|---|---:|".to_string()];
    for case in &report.cases {
      lines.push(format!(
        "| {} {} | `{}` | {:.3} |",
        status_icon(case.status),
        case.status,
        case.test_id(),
        case.elapsed_seconds
      ));
    }
    for case in failures(&report.cases) {
      lines.push(format!(
        "\n<details><summary>{}: {}</summary>\n\n```\n{}\n```\n</details>\n",
        case.status.as_str().to_uppercase(),
        case.test_id(),
        truncate_detail(&case.detail, detail_max_chars)
      ));
    }
    lines.join("\n")
  };

  format!(
    "# Test Run {timestamp}\n\n## {summary}\n\n## Per-test results\n{per_test}\n\n## Pytest stdout\n\n{}\n\n## Pytest stderr\n\n{}\n\n## Exit\n{}\n",
    output.stdout, output.stderr, output.exit_code
  )
}

/// Failed or errored raw cases that carry detail text, in run order.
pub fn failures(cases: &[RawResultCase]) -> impl Iterator<Item = &RawResultCase> {
  cases
    .iter()
    .filter(|c| c.status.is_failure() && !c.detail.is_empty())
}

/// Room kept free in every document for the part label of a split report.
const PART_LABEL_RESERVE: usize = 64;
const DETAIL_HEADERS: [&str; 3] = ["Status", "Test", "Time (s)"];

/// Characters of visible text in a rich-text block.
fn text_chars(block: &Value) -> usize {
  adf::flatten(Some(block)).chars().count()
}

/// Rich-text comment bodies: summary, a row per raw case, and one code block per failure.
///
/// Blocks are packed into as many documents as needed so that no document carries more than
/// `max_chars` characters of text. Long tables are split by rows, and a failure label always
/// travels with its detail block. Split reports open each document with a `(part N/M)` label.
pub fn detailed_docs(issue_key: &str, report: &RunReport, detail_max_chars: usize, max_chars: usize) -> Vec<Value> {
  let budget = max_chars.saturating_sub(PART_LABEL_RESERVE).max(1);
  let header_chars: usize = DETAIL_HEADERS.iter().map(|h| h.chars().count()).sum();

  let mut units: Vec<Vec<Value>> = vec![vec![adf::paragraph(&summary_line(
    issue_key,
    report.totals.as_ref(),
  ))]];

  let mut rows: Vec<Vec<String>> = Vec::new();
  let mut rows_chars = header_chars;
  for case in &report.cases {
    let row = vec![
      format!("{} {}", status_icon(case.status), case.status),
      case.test_id(),
      format!("{:.3}", case.elapsed_seconds),
    ];
    let n: usize = row.iter().map(|cell| cell.chars().count()).sum();
    if !rows.is_empty() && rows_chars + n > budget {
      units.push(vec![adf::table(&DETAIL_HEADERS, &std::mem::take(&mut rows))]);
      rows_chars = header_chars;
    }
    rows_chars += n;
    rows.push(row);
  }
  units.push(vec![adf::table(&DETAIL_HEADERS, &rows)]);

  for case in failures(&report.cases) {
    let label = format!("{}: {}", case.status.as_str().to_uppercase(), case.test_id());
    let room = budget.saturating_sub(label.chars().count() + TRUNCATED_MARKER.chars().count());
    units.push(vec![
      adf::paragraph(&label),
      adf::code_block(&truncate_detail(&case.detail, detail_max_chars.min(room))),
    ]);
  }

  let mut pages: Vec<Vec<Value>> = Vec::new();
  let mut current: Vec<Value> = Vec::new();
  let mut used = 0;
  for unit in units {
    let n: usize = unit.iter().map(text_chars).sum();
    if !current.is_empty() && used + n > budget {
      pages.push(std::mem::take(&mut current));
      used = 0;
    }
    used += n;
    current.extend(unit);
  }
  pages.push(current);

  let total = pages.len();
  pages
    .into_iter()
    .enumerate()
    .map(|(i, mut blocks)| {
      if total > 1 {
        let label = format!("Detailed test report for {issue_key} (part {}/{total})", i + 1);
        blocks.insert(0, adf::paragraph(&label));
      }
      adf::doc(blocks)
    })
    .collect()
}

pub fn strip_ansi(text: &str) -> String {
  strip_ansi_escapes::strip_str(text)
}

/// Split into consecutive pieces of at most `max_chars` characters, never inside a character.
pub fn chunk(body: &str, max_chars: usize) -> Vec<&str> {
  let max_chars = max_chars.max(1);
  let mut out = Vec::new();
  let mut rest = body;
  while !rest.is_empty() {
    let cut = rest
      .char_indices()
      .nth(max_chars)
      .map(|(i, _)| i)
      .unwrap_or(rest.len());
    let (head, tail) = rest.split_at(cut);
    out.push(head);
    rest = tail;
  }
  out
}

/// One comment to post: an optional title line and its slice of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPart<'a> {
  pub title: Option<String>,
  pub body: &'a str,
}

/// Chunk a body for posting. A part label is added only when more than one chunk is needed; an
/// untitled single chunk stays untitled.
pub fn comment_parts<'a>(body: &'a str, title: Option<&str>, max_chars: usize) -> Vec<CommentPart<'a>> {
  let chunks = chunk(body, max_chars);
  let multi = chunks.len() > 1;
  chunks
    .into_iter()
    .enumerate()
    .map(|(i, body)| {
      let title = match (title, multi) {
        (Some(t), false) => Some(t.to_string()),
        (t, true) => Some(format!("{} (part {})", t.unwrap_or("DevFlow"), i + 1)),
        (None, false) => None,
      };
      CommentPart { title, body }
    })
    .collect()
}
