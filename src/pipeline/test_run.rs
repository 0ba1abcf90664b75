use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{DevflowError, Result};
use crate::report::format::{run_report, RunOutput};
use crate::results::junit::{load_junit, RunReport};
use crate::testcase::parse::resolve_test_cases;
use crate::testcase::stub::ensure_stubs;
use crate::ticket::fields::TicketFields;

const RETRY_MARKERS: [&str; 2] = ["import file mismatch", "collected 0 items"];

/// Outcome of one test command run, after any retry.
#[derive(Debug, Clone)]
pub struct TestRun {
  pub report: RunReport,
  pub output: RunOutput,
  pub report_path: PathBuf,
}

/// Make sure every test case of the ticket has a stub. Returns how many were newly written.
pub fn ensure_tests(config: &Config, key: &str, fields: &TicketFields) -> Result<usize> {
  let cases = resolve_test_cases(&fields.tests, &fields.description);
  ensure_stubs(&config.tests_root(), key, &cases)
}

/// A failed run whose output points at stale bytecode or a broken collection.
pub fn needs_retry(output: &RunOutput) -> bool {
  output.exit_code != 0
    && RETRY_MARKERS
      .iter()
      .any(|m| output.stdout.contains(m) || output.stderr.contains(m))
}

/// Remove `.pytest_cache`, `__pycache__` and `*.pyc` under `root`. Returns how many entries went.
pub fn cleanup_pytest_artifacts(root: &Path) -> Result<usize> {
  let mut dirs = Vec::new();
  let mut files = Vec::new();

  let walker = WalkDir::new(root)
    .into_iter()
    .filter_entry(|e| e.file_name() != ".git");
  for entry in walker {
    let entry = entry?;
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() && (name == "__pycache__" || name == ".pytest_cache") {
      dirs.push(entry.path().to_path_buf());
    } else if entry.file_type().is_file() && name.ends_with(".pyc") {
      files.push(entry.path().to_path_buf());
    }
  }

  let mut removed = 0;
  for file in files.iter().filter(|f| !dirs.iter().any(|d| f.starts_with(d))) {
    match std::fs::remove_file(file) {
      Ok(()) => removed += 1,
      Err(e) => debug!("could not remove {}: {e}", file.display()),
    }
  }
  for dir in &dirs {
    match std::fs::remove_dir_all(dir) {
      Ok(()) => removed += 1,
      Err(e) => debug!("could not remove {}: {e}", dir.display()),
    }
  }

  info!("removed {removed} pytest cache entr(ies) under {}", root.display());
  Ok(removed)
}

fn run_once(config: &Config, junit_path: &Path) -> Result<RunOutput> {
  let (program, args) = config
    .settings
    .test_command
    .split_first()
    .ok_or_else(|| DevflowError::Config("test_command is empty".into()))?;

  debug!("running {program} {}", args.join(" "));
  let output = Command::new(program)
    .args(args)
    .arg(format!("--junitxml={}", junit_path.display()))
    .current_dir(&config.root)
    .env("PYTHONPATH", &config.root)
    .env("PYTHONDONTWRITEBYTECODE", "1")
    .output()
    .map_err(|e| DevflowError::Process(format!("failed to launch {program}: {e}")))?;

  Ok(RunOutput {
    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    exit_code: output.status.code().unwrap_or(-1),
  })
}

/// Run the test command for an issue, retrying once after a cache cleanup when the run looks
/// poisoned. The JUnit file is parsed whatever the exit code, and the narrative report is written
/// to `.q/<KEY>.tests.out.md`.
pub fn run_tests(config: &Config, key: &str) -> Result<TestRun> {
  config.ensure_artifacts_dir()?;
  let junit_path = config.junit_path(key);
  if junit_path.exists() {
    std::fs::remove_file(&junit_path)?;
  }

  let mut output = run_once(config, &junit_path)?;
  if needs_retry(&output) {
    warn!("test run for {key} looks poisoned by stale caches, cleaning up and retrying once");
    cleanup_pytest_artifacts(&config.root)?;
    output = run_once(config, &junit_path)?;
  }

  let report = load_junit(&junit_path);
  let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
  let report_path = config.report_path(key);
  std::fs::write(
    &report_path,
    run_report(&timestamp, &report, &output, config.settings.detail_max_chars),
  )?;

  info!(
    "tests for {key} exited with {} ({} case(s)); report: {}",
    output.exit_code,
    report.cases.len(),
    report_path.display()
  );
  Ok(TestRun {
    report,
    output,
    report_path,
  })
}
