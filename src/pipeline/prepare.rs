use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use super::prompt::write_prompt;
use crate::config::Config;
use crate::error::Result;
use crate::git::branch;
use crate::state::stack::{self, TechStack};
use crate::ticket::fields::{extract_fields, TicketFields};

#[derive(Debug)]
pub struct Prepared {
  pub fields: TicketFields,
  pub stack: TechStack,
  pub prompt: PathBuf,
  pub branch: Option<String>,
}

/// Keep the raw issue payload next to the other artifacts for inspection.
pub fn write_issue_dump(config: &Config, key: &str, issue: &Value) -> Result<PathBuf> {
  config.ensure_artifacts_dir()?;
  let path = config.artifact(key, "issue.json");
  std::fs::write(&path, serde_json::to_string_pretty(issue)?)?;
  Ok(path)
}

/// Turn a fetched issue into local artifacts: the code-generation prompt and, optionally, a work
/// branch named after the issue.
pub fn prepare(config: &Config, key: &str, issue: &Value, create_branch: bool) -> Result<Prepared> {
  let fields = extract_fields(issue, &config.fields);
  let stack = stack::resolve(&config.artifact(key, "stack.json"), &config.root)?;
  let prompt = write_prompt(config, key, &fields, &stack)?;

  let branch = if create_branch {
    Some(branch::create_branch(
      &config.root,
      &config.git,
      key,
      &fields.summary,
      &fields.issue_type,
    )?)
  } else {
    None
  };

  info!("prepared {key} ({} / {})", stack.lang, stack.framework);
  Ok(Prepared {
    fields,
    stack,
    prompt,
    branch,
  })
}

/// First `max_chars` characters, with an ellipsis when cut.
pub fn short(s: &str, max_chars: usize) -> String {
  let s = s.trim();
  match s.char_indices().nth(max_chars) {
    Some((i, _)) => format!("{}…", &s[..i]),
    None => s.to_string(),
  }
}
