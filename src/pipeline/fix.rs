use std::path::PathBuf;

use tracing::info;

use super::codegen::run_prompt_file;
use super::materialize::materialize;
use super::prompt::write_fix_prompt;
use super::test_run::{cleanup_pytest_artifacts, run_tests};
use crate::assistant::runner::CodeAssistant;
use crate::config::Config;
use crate::error::Result;
use crate::results::junit::{load_junit, RunReport};

#[derive(Debug, Clone, Copy)]
pub struct FixOptions {
  pub materialize: bool,
  pub test_after: bool,
}

#[derive(Debug)]
pub struct FixOutcome {
  pub transcript: PathBuf,
  pub materialized: Option<usize>,
  /// Results after the fix when tests were re-run, otherwise the results the fix was based on.
  pub report: RunReport,
}

/// Ask the assistant to fix the failures of the last run, apply its files and re-test.
pub fn fix_failures<A: CodeAssistant + ?Sized>(assistant: &A, config: &Config, key: &str, opts: FixOptions) -> Result<FixOutcome> {
  cleanup_pytest_artifacts(&config.root)?;

  let before = if config.junit_path(key).exists() {
    load_junit(&config.junit_path(key))
  } else {
    info!("no previous results for {key}, running tests first");
    run_tests(config, key)?.report
  };

  let prompt = write_fix_prompt(config, key, &before)?;
  let transcript = config.artifact(key, "codegen_fix.md");
  let output = run_prompt_file(assistant, config, &prompt, &transcript)?;

  let materialized = if opts.materialize {
    let n = materialize(&output.stdout, &config.root)?;
    info!("applied {n} file(s) from {}", transcript.display());
    Some(n)
  } else {
    None
  };

  let report = if opts.test_after {
    cleanup_pytest_artifacts(&config.root)?;
    run_tests(config, key)?.report
  } else {
    before
  };

  Ok(FixOutcome {
    transcript,
    materialized,
    report,
  })
}
