use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use devflow::assistant::runner::QAssistant;
use devflow::config::Config;
use devflow::error::{DevflowError, Result};
use devflow::git;
use devflow::jira::client::JiraClient;
use devflow::pipeline::fix::{self, FixOptions};
use devflow::pipeline::post::{self, PostTarget};
use devflow::pipeline::prepare::{self, short};
use devflow::pipeline::{codegen, materialize, test_run};
use devflow::results::aggregate::Unmapped;
use devflow::ticket::fields::extract_fields;

#[derive(Parser)]
#[command(
  name = "devflow",
  about = "Ticket-to-tests workflow: prepare, codegen, test, and report back to Jira"
)]
struct Cli {
  #[command(subcommand)]
  command: Commands,

  /// Path to config file (default: devflow.yaml in the repository root, if present)
  #[arg(short, long)]
  config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
  /// Fetch an issue, write its prompt and switch to a work branch
  Prepare {
    key: String,
    /// Stay on the current branch
    #[arg(long)]
    no_branch: bool,
    /// Also write the raw issue JSON to .q/<KEY>.issue.json
    #[arg(long)]
    debug: bool,
  },
  /// Run the code assistant on .q/<KEY>.prompt.md
  Codegen { key: String },
  /// Write the files found in .q/<KEY>.codegen.md
  Materialize { key: String },
  /// Ensure test stubs exist for the issue's test cases, then run the tests
  Test { key: String },
  /// Post the last codegen transcript and/or test report as comments
  Post {
    key: String,
    #[arg(long, value_enum, default_value = "codegen")]
    what: PostTarget,
  },
  /// Post the one-line run summary
  PostTestsSummary { key: String },
  /// Post one `TC-001 = PASS` line per test case
  PostTestsTc {
    key: String,
    /// Leave out failure reasons
    #[arg(long)]
    no_reason: bool,
  },
  /// Post the per-test-case table
  PostTestsTable {
    key: String,
    /// Use the last results instead of running the tests first
    #[arg(long)]
    no_run: bool,
  },
  /// Post a detailed report with a row per executed test
  PostTestsDetailed {
    key: String,
    /// Also post the narrative test log
    #[arg(long)]
    include_logs: bool,
  },
  /// Ask the assistant to fix failing tests, apply the result and re-test
  FixFailures {
    key: String,
    #[arg(long)]
    no_materialize: bool,
    #[arg(long)]
    no_test_after: bool,
    #[arg(long)]
    no_post_table: bool,
  },
  /// Commit everything as feat(<KEY>): <message>
  Commit {
    key: String,
    #[arg(short, long, default_value = "")]
    msg: String,
  },
  /// Open a pull request for the current branch with the GitHub CLI
  Pr,
  /// Open the issue prompt in an editor
  Open {
    key: String,
    #[arg(long)]
    editor: Option<String>,
  },
  /// Remove pytest caches and bytecode that cause import mismatches
  CleanupCaches,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let cli = Cli::parse();

  if let Err(e) = run(cli).await {
    error!("{e}");
    std::process::exit(1);
  }
}

async fn run(cli: Cli) -> Result<()> {
  let config = Arc::new(Config::load(cli.config.as_deref())?);

  match cli.command {
    Commands::Prepare {
      key,
      no_branch,
      debug,
    } => cmd_prepare(&config, &key, !no_branch, debug).await,
    Commands::Codegen { key } => cmd_codegen(config, key).await,
    Commands::Materialize { key } => cmd_materialize(&config, &key),
    Commands::Test { key } => cmd_test(config, key).await,
    Commands::Post { key, what } => cmd_post(&config, &key, what).await,
    Commands::PostTestsSummary { key } => {
      let client = JiraClient::from_config(&config)?;
      post::post_summary(&client, &config, &key).await?;
      println!("Posted summarized test results to Jira for {key}");
      Ok(())
    }
    Commands::PostTestsTc { key, no_reason } => {
      let client = JiraClient::from_config(&config)?;
      let n = post::post_tc_lines(&client, &config, &key, !no_reason).await?;
      println!("Posted per-TC summary for {n} cases.");
      Ok(())
    }
    Commands::PostTestsTable { key, no_run } => cmd_post_table(config, key, !no_run).await,
    Commands::PostTestsDetailed { key, include_logs } => {
      let client = JiraClient::from_config(&config)?;
      post::post_detailed(&client, &config, &key, include_logs).await?;
      println!("Posted detailed test report to Jira.");
      Ok(())
    }
    Commands::FixFailures {
      key,
      no_materialize,
      no_test_after,
      no_post_table,
    } => {
      let opts = FixOptions {
        materialize: !no_materialize,
        test_after: !no_test_after,
      };
      cmd_fix_failures(config, key, opts, !no_post_table).await
    }
    Commands::Commit { key, msg } => cmd_commit(&config, &key, &msg).await,
    Commands::Pr => git::branch::open_pr(&config.root),
    Commands::Open { key, editor } => cmd_open(&config, &key, editor.as_deref()),
    Commands::CleanupCaches => {
      let n = test_run::cleanup_pytest_artifacts(&config.root)?;
      println!("Cleaned .pytest_cache, __pycache__, and *.pyc ({n} entries)");
      Ok(())
    }
  }
}

/// Run blocking work (child processes, filesystem walks) off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
  F: FnOnce() -> Result<T> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| DevflowError::Process(format!("spawn_blocking: {e}")))?
}

async fn cmd_prepare(config: &Config, key: &str, create_branch: bool, debug: bool) -> Result<()> {
  let client = JiraClient::from_config(config)?;
  let issue = client.get_issue(key).await?;

  if debug {
    let path = prepare::write_issue_dump(config, key, &issue)?;
    println!("Issue JSON: {}", path.display());
  }

  let prepared = prepare::prepare(config, key, &issue, create_branch)?;
  let fields = &prepared.fields;
  let or_none = |s: &str| {
    let s = short(s, 400);
    if s.is_empty() {
      "(none)".to_string()
    } else {
      s
    }
  };

  println!("\nKey: {key}");
  println!("Type: {}", fields.issue_type);
  println!("Title: {}", fields.summary);
  if let Some(branch) = &prepared.branch {
    println!("Branch: {branch}");
  }
  println!("\nDescription:\n{}\n", short(&fields.description, 400));
  println!("Acceptance Criteria:\n{}\n", or_none(&fields.acceptance));
  println!("Test Cases:\n{}\n", or_none(&fields.tests));
  println!("Prompt: {}", prepared.prompt.display());
  Ok(())
}

async fn cmd_codegen(config: Arc<Config>, key: String) -> Result<()> {
  let (output, path) = blocking(move || {
    let assistant = QAssistant::new(config.settings.assistant_bin.clone());
    codegen::codegen(&assistant, &config, &key)
  })
  .await?;
  println!("Q completed rc={}. Output: {}", output.exit_code, path.display());
  Ok(())
}

fn cmd_materialize(config: &Config, key: &str) -> Result<()> {
  let path = config.artifact(key, "codegen.md");
  let markdown = std::fs::read_to_string(&path).map_err(|_| {
    DevflowError::NotFound(format!(
      "No codegen output to materialize at {}. Run `devflow codegen {key}` first.",
      path.display()
    ))
  })?;
  let n = materialize::materialize(&markdown, &config.root)?;
  println!("Wrote {n} files from {}", path.display());
  Ok(())
}

async fn cmd_test(config: Arc<Config>, key: String) -> Result<()> {
  let client = JiraClient::from_config(&config)?;
  let issue = client.get_issue(&key).await?;
  let fields = extract_fields(&issue, &config.fields);

  let run = blocking(move || {
    let written = test_run::ensure_tests(&config, &key, &fields)?;
    if written > 0 {
      info!("{written} new test stub(s) for {key}");
    }
    test_run::run_tests(&config, &key)
  })
  .await?;

  println!(
    "pytest rc={}. Report: {}",
    run.output.exit_code,
    run.report_path.display()
  );
  Ok(())
}

async fn cmd_post(config: &Config, key: &str, what: PostTarget) -> Result<()> {
  let client = JiraClient::from_config(config)?;
  let posted = post::post_artifacts(&client, config, key, what).await?;
  if posted.is_empty() {
    println!("Nothing to post.");
  } else {
    println!("Posted: {}", posted.join(","));
  }
  Ok(())
}

async fn cmd_post_table(config: Arc<Config>, key: String, run_first: bool) -> Result<()> {
  let client = JiraClient::from_config(&config)?;

  let report = if run_first {
    let (config, key) = (config.clone(), key.clone());
    blocking(move || test_run::run_tests(&config, &key)).await?.report
  } else {
    post::stored_report(&config, &key)?
  };

  post::post_tc_table(&client, &config, &key, &report, Unmapped::Drop).await?;
  println!("Posted per-TC table for {key}.");
  Ok(())
}

async fn cmd_fix_failures(config: Arc<Config>, key: String, opts: FixOptions, post_table: bool) -> Result<()> {
  // Fail before spending an assistant run when the results cannot be posted.
  let client = if post_table {
    Some(JiraClient::from_config(&config)?)
  } else {
    None
  };

  let outcome = {
    let (config, key) = (config.clone(), key.clone());
    blocking(move || {
      let assistant = QAssistant::new(config.settings.assistant_bin.clone());
      fix::fix_failures(&assistant, &config, &key, opts)
    })
    .await?
  };

  println!("Q fix completed. Output: {}", outcome.transcript.display());
  if let Some(n) = outcome.materialized {
    println!("Applied {n} files from codegen fix output");
  }

  if let Some(client) = client {
    if outcome.report.cases.is_empty() {
      println!("No testcases found in JUnit to post.");
    } else {
      post::post_tc_table(&client, &config, &key, &outcome.report, Unmapped::ByName).await?;
      println!("Posted concise per-TC table to Jira");
    }
  }
  Ok(())
}

async fn cmd_commit(config: &Config, key: &str, msg: &str) -> Result<()> {
  let message = if msg.is_empty() {
    issue_summary(config, key).await.unwrap_or_else(|e| {
      warn!("could not fetch summary for {key}: {e}");
      String::new()
    })
  } else {
    msg.to_string()
  };
  git::branch::commit(&config.root, key, &message)
}

async fn issue_summary(config: &Config, key: &str) -> Result<String> {
  let client = JiraClient::from_config(config)?;
  let issue = client.get_issue(key).await?;
  Ok(extract_fields(&issue, &config.fields).summary)
}

fn cmd_open(config: &Config, key: &str, editor: Option<&str>) -> Result<()> {
  let prompt = config.artifact(key, "prompt.md");
  if !prompt.exists() {
    return Err(DevflowError::NotFound(format!(
      "Prompt not found. Run `devflow prepare {key}` first."
    )));
  }

  let editor = editor.unwrap_or("code");
  let mut cmd = std::process::Command::new(editor);
  if editor == "code" {
    cmd.arg("--reuse-window");
  }
  cmd.arg(&prompt).spawn().map_err(|e| match e.kind() {
    std::io::ErrorKind::NotFound => DevflowError::NotFound(format!(
      "Editor `{editor}` not found. Pass --editor or install VS Code."
    )),
    _ => DevflowError::Io(e),
  })?;
  Ok(())
}
