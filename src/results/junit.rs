//! Reading JUnit XML produced by the test runner.

use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{DevflowError, Result};

const TESTSUITE: &[u8] = b"testsuite";
const TESTCASE: &[u8] = b"testcase";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
  Passed,
  Failure,
  Error,
  Skipped,
}

impl CaseStatus {
  /// Worst-wins ordering used when several raw results share one test case.
  pub fn priority(self) -> u8 {
    match self {
      CaseStatus::Error | CaseStatus::Failure => 3,
      CaseStatus::Skipped => 2,
      CaseStatus::Passed => 1,
    }
  }

  pub fn is_failure(self) -> bool {
    matches!(self, CaseStatus::Failure | CaseStatus::Error)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      CaseStatus::Passed => "passed",
      CaseStatus::Failure => "failure",
      CaseStatus::Error => "error",
      CaseStatus::Skipped => "skipped",
    }
  }

  fn from_marker(tag: &[u8]) -> Option<Self> {
    match tag {
      b"failure" => Some(CaseStatus::Failure),
      b"error" => Some(CaseStatus::Error),
      b"skipped" => Some(CaseStatus::Skipped),
      _ => None,
    }
  }
}

impl std::fmt::Display for CaseStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One executed test as the runner reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawResultCase {
  pub name: String,
  pub class_name: String,
  pub elapsed_seconds: f64,
  pub status: CaseStatus,
  pub detail: String,
}

impl RawResultCase {
  pub fn new(name: &str, status: CaseStatus, elapsed_seconds: f64, detail: &str) -> Self {
    Self {
      name: name.to_string(),
      class_name: String::new(),
      elapsed_seconds,
      status,
      detail: detail.to_string(),
    }
  }

  /// `class::name`, without dangling separators when either part is missing.
  pub fn test_id(&self) -> String {
    format!("{}::{}", self.class_name, self.name)
      .trim_matches(':')
      .to_string()
  }
}

/// Raw counters summed over suites; duplicates and parametrizations all count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
  pub tests: u64,
  pub failures: u64,
  pub errors: u64,
  pub skipped: u64,
  pub passed: u64,
}

impl RunTotals {
  fn add_suite(&mut self, suite: &HashMap<String, String>) {
    let count = |k: &str| suite.get(k).and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(0);
    self.tests += count("tests");
    self.failures += count("failures");
    self.errors += count("errors");
    self.skipped += count("skipped");
    self.passed = self
      .tests
      .saturating_sub(self.failures + self.errors + self.skipped);
  }
}

/// Parsed run. `totals` is `None` when no suite could be read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
  pub totals: Option<RunTotals>,
  pub cases: Vec<RawResultCase>,
}

impl RunReport {
  pub fn is_empty(&self) -> bool {
    self.totals.is_none() && self.cases.is_empty()
  }
}

struct SuiteAcc {
  depth: usize,
  attrs: HashMap<String, String>,
  cases: Vec<RawResultCase>,
}

struct OpenMarker {
  status: CaseStatus,
  message: String,
  text: String,
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
  let mut out = HashMap::new();
  for attr in e.attributes() {
    let attr = attr.map_err(|err| DevflowError::Junit(err.to_string()))?;
    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
    let value = attr
      .unescape_value()
      .map_err(|err| DevflowError::Junit(err.to_string()))?
      .to_string();
    out.insert(key, value);
  }
  Ok(out)
}

fn marker_detail(status: CaseStatus, message: &str, text: &str) -> String {
  match status {
    CaseStatus::Skipped => message.trim().to_string(),
    _ => format!("{message}\n{text}").trim().to_string(),
  }
}

/// Parse JUnit XML. Suites may be the root element, children of the root, or nested deeper;
/// the shallowest level that holds suites is the one counted.
pub fn parse_junit(xml: &str) -> Result<RunReport> {
  let mut reader = Reader::from_str(xml);

  let mut stack: Vec<Vec<u8>> = Vec::new();
  let mut suites: Vec<SuiteAcc> = Vec::new();
  let mut open_suites: Vec<usize> = Vec::new();
  let mut case: Option<RawResultCase> = None;
  let mut marker: Option<OpenMarker> = None;

  loop {
    let event = reader
      .read_event()
      .map_err(|e| DevflowError::Junit(format!("at byte {}: {e}", reader.buffer_position())))?;

    match event {
      Event::Start(ref e) | Event::Empty(ref e) => {
        let is_empty = matches!(event, Event::Empty(_));
        let name = e.name().as_ref().to_vec();
        let parent = stack.last().map(Vec::as_slice);

        if name == TESTSUITE {
          suites.push(SuiteAcc {
            depth: stack.len(),
            attrs: attributes(e)?,
            cases: Vec::new(),
          });
          if !is_empty {
            open_suites.push(suites.len() - 1);
          }
        } else if name == TESTCASE && parent == Some(TESTSUITE) && case.is_none() {
          let attrs = attributes(e)?;
          let get = |k: &str| attrs.get(k).cloned().unwrap_or_default();
          let new_case = RawResultCase {
            name: get("name"),
            class_name: get("classname"),
            elapsed_seconds: get("time").trim().parse().unwrap_or(0.0),
            status: CaseStatus::Passed,
            detail: String::new(),
          };
          if is_empty {
            if let Some(&idx) = open_suites.last() {
              suites[idx].cases.push(new_case);
            }
          } else {
            case = Some(new_case);
          }
        } else if let (Some(status), Some(current)) = (CaseStatus::from_marker(&name), case.as_mut()) {
          // At most one marker decides the status; later ones are ignored.
          if parent == Some(TESTCASE) && current.status == CaseStatus::Passed {
            let message = attributes(e)?.remove("message").unwrap_or_default();
            current.status = status;
            if is_empty {
              current.detail = marker_detail(status, &message, "");
            } else {
              marker = Some(OpenMarker {
                status,
                message,
                text: String::new(),
              });
            }
          }
        }

        if !is_empty {
          stack.push(name);
        }
      }
      Event::Text(t) => {
        if let Some(m) = marker.as_mut() {
          let text = t.unescape().map_err(|e| DevflowError::Junit(e.to_string()))?;
          m.text.push_str(&text);
        }
      }
      Event::CData(c) => {
        if let Some(m) = marker.as_mut() {
          m.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
        }
      }
      Event::End(e) => {
        let name = e.name().as_ref().to_vec();
        stack.pop();

        if name == TESTSUITE {
          open_suites.pop();
        } else if name == TESTCASE {
          if let Some(done) = case.take() {
            if let Some(&idx) = open_suites.last() {
              suites[idx].cases.push(done);
            }
          }
        } else if CaseStatus::from_marker(&name).is_some() {
          if let (Some(m), Some(current)) = (marker.take(), case.as_mut()) {
            current.detail = marker_detail(m.status, &m.message, &m.text);
          }
        }
      }
      Event::Eof => break,
      _ => {}
    }
  }

  let Some(top) = suites.iter().map(|s| s.depth).min() else {
    debug!("junit: no testsuite elements");
    return Ok(RunReport::default());
  };

  let mut totals = RunTotals::default();
  let mut cases = Vec::new();
  for suite in suites.into_iter().filter(|s| s.depth == top) {
    totals.add_suite(&suite.attrs);
    cases.extend(suite.cases);
  }

  debug!("junit: {} case(s), totals {totals:?}", cases.len());
  Ok(RunReport {
    totals: Some(totals),
    cases,
  })
}

/// Read a JUnit file. Missing or corrupt files yield an empty report rather than an error.
pub fn load_junit(path: &Path) -> RunReport {
  let content = match std::fs::read_to_string(path) {
    Ok(c) => c,
    Err(e) => {
      debug!("junit file {} unreadable: {e}", path.display());
      return RunReport::default();
    }
  };

  parse_junit(&content).unwrap_or_else(|e| {
    warn!("ignoring corrupt junit file {}: {e}", path.display());
    RunReport::default()
  })
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  const PYTEST_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites>
  <testsuite name="pytest" errors="1" failures="1" skipped="1" tests="4" time="2.0">
    <testcase classname="tests.PROJ-1.test_proj_1_tc_001" name="test_tc_001" time="0.5"/>
    <testcase classname="tests.PROJ-1.test_proj_1_tc_002" name="test_tc_002" time="1.25">
      <failure message="AssertionError: boom">def test_tc_002():
&gt;       assert False
E       AssertionError: boom</failure>
    </testcase>
    <testcase classname="tests.PROJ-1.test_proj_1_tc_003" name="test_tc_003" time="0.1">
      <skipped type="pytest.skip" message="not ready">skip body ignored</skipped>
    </testcase>
    <testcase classname="tests.test_misc" name="test_import" time="0.0">
      <error message="ImportError"><![CDATA[Traceback <here>]]></error>
    </testcase>
  </testsuite>
</testsuites>"#;

  #[test]
  fn parses_pytest_output() {
    let report = parse_junit(PYTEST_XML).unwrap();
    assert_eq!(
      report.totals,
      Some(RunTotals {
        tests: 4,
        failures: 1,
        errors: 1,
        skipped: 1,
        passed: 1,
      })
    );
    assert_eq!(report.cases.len(), 4);

    let statuses: Vec<CaseStatus> = report.cases.iter().map(|c| c.status).collect();
    assert_eq!(
      statuses,
      vec![
        CaseStatus::Passed,
        CaseStatus::Failure,
        CaseStatus::Skipped,
        CaseStatus::Error
      ]
    );

    let failed = &report.cases[1];
    assert_eq!(failed.elapsed_seconds, 1.25);
    assert!(failed.detail.starts_with("AssertionError: boom\ndef test_tc_002():\n>       assert False"));
    assert_eq!(report.cases[2].detail, "not ready");
    assert_eq!(report.cases[3].detail, "ImportError\nTraceback <here>");
    assert_eq!(report.cases[0].test_id(), "tests.PROJ-1.test_proj_1_tc_001::test_tc_001");
  }

  #[test]
  fn root_testsuite_is_accepted() {
    let xml = r#"<testsuite tests="2" failures="0" errors="0" skipped="0">
      <testcase name="a" time="0.2"/><testcase name="b" time="bad"/>
    </testsuite>"#;
    let report = parse_junit(xml).unwrap();
    assert_eq!(report.totals.unwrap().passed, 2);
    assert_eq!(report.cases[1].elapsed_seconds, 0.0);
    assert_eq!(report.cases[1].test_id(), "b");
  }

  #[test]
  fn suites_nested_one_level_deeper() {
    let xml = r#"<results><run>
      <testsuite tests="1" failures="1"><testcase name="x"><failure message="m"/></testcase></testsuite>
      <testsuite tests="2" skipped="1"><testcase name="y"/><testcase name="z"><skipped/></testcase></testsuite>
    </run></results>"#;
    let report = parse_junit(xml).unwrap();
    let totals = report.totals.unwrap();
    assert_eq!((totals.tests, totals.failures, totals.skipped, totals.passed), (3, 1, 1, 1));
    assert_eq!(report.cases.len(), 3);
    assert_eq!(report.cases[0].detail, "m");
  }

  #[test]
  fn no_suites_means_no_totals() {
    let report = parse_junit("<report/>").unwrap();
    assert!(report.is_empty());
  }

  #[test]
  fn corrupt_or_missing_files_are_empty() {
    let tmp = tempfile::TempDir::new().unwrap();
    assert!(load_junit(&tmp.path().join("missing.xml")).is_empty());

    let bad = tmp.path().join("bad.xml");
    std::fs::write(&bad, "<testsuites><testsuite tests=\"1\"></testcase>").unwrap();
    assert!(load_junit(&bad).is_empty());
  }

  #[test]
  fn priority_order() {
    assert!(CaseStatus::Error.priority() > CaseStatus::Skipped.priority());
    assert_eq!(CaseStatus::Error.priority(), CaseStatus::Failure.priority());
    assert!(CaseStatus::Skipped.priority() > CaseStatus::Passed.priority());
  }
}
