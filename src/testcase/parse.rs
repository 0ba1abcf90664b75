use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::id::CanonicalId;

/// `<TCID> | scenario | steps | expected`, with optional outer pipes.
static TABLE_ROW: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)^\|?\s*(TC[-_ ]?\d+)\s*\|\s*(.*?)\s*\|\s*(.*?)\s*\|\s*(.*?)\s*\|?\s*$")
    .expect("valid regex")
});

static TABLE_HEADER_ID: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)\bid\b").expect("valid regex"));

static BLOCK_ID_LINE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)^\s*(TC[-_ ]?\d+)\s*$").expect("valid regex"));

static ID_TOKEN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)TC[-_ ]?\d+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseRecord {
  pub id: CanonicalId,
  pub scenario: String,
  pub steps: String,
  pub expected: String,
}

impl TestCaseRecord {
  pub fn new(id: CanonicalId, scenario: &str, steps: &str, expected: &str) -> Self {
    Self {
      id,
      scenario: scenario.trim().to_string(),
      steps: steps.trim().to_string(),
      expected: expected.trim().to_string(),
    }
  }

  /// Placeholder used when a ticket names no test cases at all.
  pub fn seed() -> Self {
    Self::new(CanonicalId::normalize("TC-001"), "Seed test", "", "")
  }
}

pub type Strategy = fn(&str) -> Vec<TestCaseRecord>;

/// Where a strategy looks: the extracted test-case section or the whole description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  Section,
  Description,
}

/// Tried in order; the first non-empty result wins. Tables are only read from the section.
pub const RESOLUTION_ORDER: [(&str, Strategy, Source); 5] = [
  ("pipe-table", parse_pipe_table, Source::Section),
  ("vertical-block", parse_vertical_blocks, Source::Section),
  ("vertical-block", parse_vertical_blocks, Source::Description),
  ("minified", parse_minified, Source::Section),
  ("minified", parse_minified, Source::Description),
];

/// Pipe table: rows after a header line that names an `id` column and has at least three pipes.
/// Non-matching lines after the header (separators, commentary) are skipped, not terminators.
pub fn parse_pipe_table(text: &str) -> Vec<TestCaseRecord> {
  let mut rows = Vec::new();
  let mut in_table = false;

  for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
    if !in_table {
      in_table = TABLE_HEADER_ID.is_match(line) && line.matches('|').count() >= 3;
      continue;
    }
    if let Some(caps) = TABLE_ROW.captures(line) {
      rows.push(TestCaseRecord::new(
        CanonicalId::normalize(&caps[1]),
        &caps[2],
        &caps[3],
        &caps[4],
      ));
    }
  }

  rows
}

/// Vertical blocks: a line that is exactly an id, then scenario, steps and expected on the next
/// three non-blank lines. A short trailing block keeps empty fields.
pub fn parse_vertical_blocks(text: &str) -> Vec<TestCaseRecord> {
  let lines: Vec<&str> = text.lines().collect();
  let next_non_blank = |from: usize| (from..lines.len()).find(|&j| !lines[j].trim().is_empty());

  let mut out = Vec::new();
  let mut i = 0;
  while i < lines.len() {
    let Some(caps) = BLOCK_ID_LINE.captures(lines[i]) else {
      i += 1;
      continue;
    };

    let mut fields = [""; 3];
    let mut cursor = i + 1;
    let mut last = i;
    for field in fields.iter_mut() {
      match next_non_blank(cursor) {
        Some(j) => {
          *field = lines[j];
          last = j;
          cursor = j + 1;
        }
        None => break,
      }
    }

    out.push(TestCaseRecord::new(
      CanonicalId::normalize(&caps[1]),
      fields[0],
      fields[1],
      fields[2],
    ));
    i = last + 1;
  }

  out
}

/// Run-on text: split at every id token; each segment's first line becomes the scenario.
/// Adjacent ids produce records with an empty scenario.
pub fn parse_minified(text: &str) -> Vec<TestCaseRecord> {
  let tokens: Vec<_> = ID_TOKEN.find_iter(text).collect();
  tokens
    .iter()
    .enumerate()
    .map(|(n, m)| {
      let end = tokens.get(n + 1).map(|next| next.start()).unwrap_or(text.len());
      let body = text[m.end()..end].trim();
      let scenario = body.lines().next().unwrap_or("");
      TestCaseRecord::new(CanonicalId::normalize(m.as_str()), scenario, "", "")
    })
    .collect()
}

/// Run the strategies over one text.
pub fn parse_test_cases(text: &str) -> Vec<TestCaseRecord> {
  resolve_test_cases(text, "")
}

/// Find the test cases of a ticket by walking `RESOLUTION_ORDER`. Ids are de-duplicated by
/// canonical form (first occurrence wins); when nothing is found a single seed record is returned.
pub fn resolve_test_cases(section: &str, description: &str) -> Vec<TestCaseRecord> {
  for (name, strategy, source) in RESOLUTION_ORDER {
    let text = match source {
      Source::Section => section,
      Source::Description => description,
    };
    if text.trim().is_empty() {
      continue;
    }
    let found = strategy(text);
    if !found.is_empty() {
      debug!("{name} strategy matched {} case(s) in {source:?}", found.len());
      return dedup(found);
    }
  }

  debug!("no test cases found, seeding default");
  vec![TestCaseRecord::seed()]
}

fn dedup(records: Vec<TestCaseRecord>) -> Vec<TestCaseRecord> {
  let mut seen = HashSet::new();
  records
    .into_iter()
    .filter(|r| seen.insert(r.id.clone()))
    .collect()
}
