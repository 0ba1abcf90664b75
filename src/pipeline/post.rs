use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::error::{DevflowError, Result};
use crate::jira::client::JiraClient;
use crate::report::format::{detailed_docs, summary_line, tc_lines, tc_table};
use crate::results::aggregate::{aggregate_with, Unmapped};
use crate::results::junit::{load_junit, RunReport};

/// Which stored artifact `post` sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PostTarget {
  Codegen,
  Tests,
  Both,
}

impl PostTarget {
  fn includes_codegen(self) -> bool {
    matches!(self, PostTarget::Codegen | PostTarget::Both)
  }

  fn includes_tests(self) -> bool {
    matches!(self, PostTarget::Tests | PostTarget::Both)
  }
}

/// Results of the last run, or `NotFound` when no run has produced a JUnit file yet.
pub fn stored_report(config: &Config, key: &str) -> Result<RunReport> {
  let path = config.junit_path(key);
  if !path.exists() {
    return Err(DevflowError::NotFound(format!(
      "JUnit file not found: {}. Run `devflow test {key}` first.",
      path.display()
    )));
  }
  Ok(load_junit(&path))
}

pub fn summary_body(key: &str, report: &RunReport) -> Result<String> {
  if report.totals.is_none() {
    return Err(DevflowError::NotFound("No test data parsed.".into()));
  }
  Ok(summary_line(key, report.totals.as_ref()))
}

pub fn tc_lines_body(report: &RunReport, include_reason: bool, reason_max_chars: usize) -> Result<String> {
  if report.cases.is_empty() {
    return Err(DevflowError::NotFound("No test cases discovered in JUnit.".into()));
  }
  let agg = aggregate_with(&report.cases, Unmapped::Drop, reason_max_chars);
  if agg.is_empty() {
    return Err(DevflowError::NotFound(
      "No TC-### identifiers found in test names.".into(),
    ));
  }
  Ok(tc_lines(&agg, include_reason))
}

pub fn tc_table_body(key: &str, report: &RunReport, unmapped: Unmapped, reason_max_chars: usize) -> Result<String> {
  if report.cases.is_empty() {
    return Err(DevflowError::NotFound(
      "No JUnit test cases found. Ensure tests are named with TC ids (e.g. test_tc_001_...).".into(),
    ));
  }
  let agg = aggregate_with(&report.cases, unmapped, reason_max_chars);
  Ok(tc_table(key, report.totals.as_ref(), &agg))
}

pub async fn post_summary(client: &JiraClient, config: &Config, key: &str) -> Result<()> {
  let body = summary_body(key, &stored_report(config, key)?)?;
  client
    .post_chunked(key, &body, Some("Test Results"), config.settings.max_comment_chars)
    .await?;
  info!("posted test summary to {key}");
  Ok(())
}

pub async fn post_tc_lines(client: &JiraClient, config: &Config, key: &str, include_reason: bool) -> Result<usize> {
  let body = tc_lines_body(
    &stored_report(config, key)?,
    include_reason,
    config.settings.reason_max_chars,
  )?;
  client
    .post_chunked(key, &body, None, config.settings.max_comment_chars)
    .await?;
  Ok(body.lines().count())
}

pub async fn post_tc_table(client: &JiraClient, config: &Config, key: &str, report: &RunReport, unmapped: Unmapped) -> Result<()> {
  let body = tc_table_body(key, report, unmapped, config.settings.reason_max_chars)?;
  client
    .post_chunked(key, &body, None, config.settings.max_comment_chars)
    .await?;
  info!("posted per-test-case table to {key}");
  Ok(())
}

/// Rich-text report with a row per raw case, split into comments that fit the size limit, and
/// optionally followed by the narrative log.
pub async fn post_detailed(client: &JiraClient, config: &Config, key: &str, include_logs: bool) -> Result<()> {
  let report = stored_report(config, key)?;
  if report.totals.is_none() {
    return Err(DevflowError::NotFound("No test data parsed.".into()));
  }
  let docs = detailed_docs(
    key,
    &report,
    config.settings.detail_max_chars,
    config.settings.max_comment_chars,
  );
  for doc in docs {
    client.add_comment(key, doc).await?;
  }

  if include_logs {
    let log = config.report_path(key);
    match std::fs::read_to_string(&log) {
      Ok(text) => {
        client
          .post_chunked(key, &text, Some("Pytest log"), config.settings.max_comment_chars)
          .await?;
      }
      Err(_) => info!("no test log at {}, skipping", log.display()),
    }
  }
  Ok(())
}

/// Files `post` would send for `target`, in posting order, with their labels.
pub fn artifacts_to_post(config: &Config, key: &str, target: PostTarget) -> Vec<(&'static str, PathBuf)> {
  let mut out = Vec::new();
  if target.includes_codegen() {
    out.push(("codegen", config.artifact(key, "codegen.md")));
  }
  if target.includes_tests() {
    out.push(("tests", config.report_path(key)));
  }
  out.into_iter().filter(|(_, p)| p.exists()).collect()
}

/// Post stored transcripts and reports. Returns the labels of what was posted.
pub async fn post_artifacts(client: &JiraClient, config: &Config, key: &str, target: PostTarget) -> Result<Vec<&'static str>> {
  let mut posted = Vec::new();
  for (label, path) in artifacts_to_post(config, key, target) {
    let text = std::fs::read_to_string(&path)?;
    client
      .post_chunked(key, &text, None, config.settings.max_comment_chars)
      .await?;
    posted.push(label);
  }
  Ok(posted)
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::results::junit::{parse_junit, CaseStatus, RawResultCase};

  const XML: &str = r#"<testsuites><testsuite tests="3" failures="1" errors="0" skipped="0">
<testcase classname="tests.PROJ-1.test_proj_1_tc_001" name="test_tc_001" time="0.25"/>
<testcase classname="tests.PROJ-1.test_proj_1_tc_002" name="test_tc_002" time="0.5"><failure message="AssertionError: boom">x</failure></testcase>
<testcase classname="tests.test_misc" name="test_helper" time="0.1"/>
</testsuite></testsuites>"#;

  fn report() -> RunReport {
    parse_junit(XML).unwrap()
  }

  #[test]
  fn missing_junit_tells_what_to_run() {
    let tmp = TempDir::new().unwrap();
    let config = Config::for_root(tmp.path());
    let err = stored_report(&config, "PROJ-1").unwrap_err();
    assert!(err.to_string().contains("Run `devflow test PROJ-1` first"));
  }

  #[test]
  fn stored_report_reads_junit() {
    let tmp = TempDir::new().unwrap();
    let config = Config::for_root(tmp.path());
    config.ensure_artifacts_dir().unwrap();
    std::fs::write(config.junit_path("PROJ-1"), XML).unwrap();
    assert_eq!(stored_report(&config, "PROJ-1").unwrap(), report());
  }

  #[test]
  fn summary_requires_totals() {
    assert_eq!(
      summary_body("PROJ-1", &report()).unwrap(),
      "Unit Test Summary for PROJ-1: 2 passed, 1 failed, 0 errors, 0 skipped, total 3."
    );
    assert!(summary_body("PROJ-1", &RunReport::default()).is_err());
  }

  #[test]
  fn tc_lines_need_ids() {
    assert_eq!(
      tc_lines_body(&report(), true, 140).unwrap(),
      "TC-001 = PASS\nTC-002 = FAIL - AssertionError: boom"
    );
    let unmapped = RunReport {
      totals: None,
      cases: vec![RawResultCase::new("test_helper", CaseStatus::Passed, 0.0, "")],
    };
    assert!(tc_lines_body(&unmapped, true, 140).is_err());
  }

  #[test]
  fn table_drops_or_buckets_unmapped() {
    let dropped = tc_table_body("PROJ-1", &report(), Unmapped::Drop, 140).unwrap();
    assert!(!dropped.contains("TEST_HELPER"));

    let bucketed = tc_table_body("PROJ-1", &report(), Unmapped::ByName, 140).unwrap();
    assert!(bucketed.contains("TEST_HELPER | Pass | 0.100 | "));
    assert!(bucketed.contains("TC-002 | Fail | 0.500 | AssertionError: boom"));
  }

  #[test]
  fn only_existing_artifacts_are_posted() {
    let tmp = TempDir::new().unwrap();
    let config = Config::for_root(tmp.path());
    config.ensure_artifacts_dir().unwrap();
    std::fs::write(config.report_path("PROJ-1"), "report").unwrap();

    let labels: Vec<_> = artifacts_to_post(&config, "PROJ-1", PostTarget::Both)
      .into_iter()
      .map(|(l, _)| l)
      .collect();
    assert_eq!(labels, vec!["tests"]);
    assert!(artifacts_to_post(&config, "PROJ-1", PostTarget::Codegen).is_empty());
  }
}
