use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::report::format::failures;
use crate::results::aggregate::reason_line;
use crate::results::junit::RunReport;
use crate::state::stack::TechStack;
use crate::ticket::fields::TicketFields;

const NOT_PROVIDED: &str = "_Not provided_";
const FAILURE_LINE_MAX_CHARS: usize = 300;
pub const REPORT_EXCERPT_MAX_CHARS: usize = 4000;

fn or_not_provided(s: &str) -> &str {
  if s.trim().is_empty() {
    NOT_PROVIDED
  } else {
    s
  }
}

pub fn prompt_body(key: &str, fields: &TicketFields, stack: &TechStack) -> String {
  format!(
    "# {key}: {summary}\n\n\
     ## Tech Context\n{context}\n\n\
     ## User Story\n{story}\n\n\
     ## Acceptance Criteria\n{acceptance}\n\n\
     ## Deliverables\n\
     Generate or update {framework} files that satisfy the above.\n\
     Output actual working code files, not pseudocode.\n\
     Emit every file as a `# file: path/to/file` line followed by a fenced code block.\n\n\
     ## Tests\n{tests}\n",
    summary = fields.summary,
    context = stack.tech_context(),
    story = fields.description,
    acceptance = or_not_provided(&fields.acceptance),
    framework = stack.framework,
    tests = or_not_provided(&fields.tests),
  )
}

/// Write `.q/<KEY>.prompt.md`.
pub fn write_prompt(config: &Config, key: &str, fields: &TicketFields, stack: &TechStack) -> Result<PathBuf> {
  config.ensure_artifacts_dir()?;
  let path = config.artifact(key, "prompt.md");
  std::fs::write(&path, prompt_body(key, fields, stack))?;
  info!("wrote {}", path.display());
  Ok(path)
}

/// The last `max_chars` characters, where failures usually are.
pub fn tail(text: &str, max_chars: usize) -> &str {
  let count = text.chars().count();
  if count <= max_chars {
    return text;
  }
  let start = text
    .char_indices()
    .nth(count - max_chars)
    .map(|(i, _)| i)
    .unwrap_or(0);
  &text[start..]
}

/// Prompt asking the assistant to fix what the last run reported as failing.
pub fn fix_prompt_body(key: &str, report: &RunReport, report_text: &str) -> String {
  let failing: Vec<_> = failures(&report.cases).collect();
  let excerpt = tail(report_text, REPORT_EXCERPT_MAX_CHARS);

  if failing.is_empty() && excerpt.trim().is_empty() {
    return format!(
      "# {key}: No failing tests detected.\n\nProceed to validate implementation and ensure coverage."
    );
  }

  let mut lines = vec![format!("# {key}: Fix failing tests"), String::new()];
  if !failing.is_empty() {
    lines.push("## Failing tests (first line)\n".into());
    for case in &failing {
      lines.push(format!(
        "- {} - {}: {}",
        case.test_id(),
        case.status.as_str().to_uppercase(),
        reason_line(&case.detail, FAILURE_LINE_MAX_CHARS)
      ));
    }
    lines.push(String::new());
    lines.push("## Full failure details\n".into());
    for case in &failing {
      lines.push(format!("### {}\n", case.test_id()));
      lines.push("```text".into());
      lines.push(case.detail.clone());
      lines.push("```".into());
      lines.push(String::new());
    }
  }
  if !excerpt.trim().is_empty() {
    lines.push("## Test output (excerpt)\n".into());
    lines.push("```text".into());
    lines.push(excerpt.to_string());
    lines.push("```".into());
    lines.push(String::new());
  }
  lines.extend(
    [
      "## Instructions",
      "- Analyze failures and update code in this repository to make tests pass.",
      "- Output fixes as materializable blocks with headings like `# file: path/to/file.py` followed by fenced code.",
      "- Do not modify unrelated code; keep changes minimal and focused.",
    ]
    .map(String::from),
  );
  lines.join("\n")
}

/// Write `.q/<KEY>.fixprompt.md` from the stored results and narrative report.
pub fn write_fix_prompt(config: &Config, key: &str, report: &RunReport) -> Result<PathBuf> {
  config.ensure_artifacts_dir()?;
  let report_text = std::fs::read_to_string(config.report_path(key)).unwrap_or_default();
  let path = config.artifact(key, "fixprompt.md");
  std::fs::write(&path, fix_prompt_body(key, report, &report_text))?;
  info!("wrote {}", path.display());
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::results::junit::{CaseStatus, RawResultCase};

  fn fields() -> TicketFields {
    TicketFields {
      summary: "Contact form".into(),
      description: "As a visitor I want to get in touch".into(),
      acceptance: "Form validates".into(),
      tests: String::new(),
      issue_type: "Story".into(),
    }
  }

  #[test]
  fn prompt_has_all_sections() {
    let stack = TechStack {
      lang: "python".into(),
      framework: "django".into(),
    };
    let body = prompt_body("PROJ-1", &fields(), &stack);
    assert!(body.starts_with("# PROJ-1: Contact form\n\n## Tech Context\nProject uses **Python 3.x** and **Django 5.x**."));
    assert!(body.contains("## User Story\nAs a visitor"));
    assert!(body.contains("## Acceptance Criteria\nForm validates\n"));
    assert!(body.contains("Generate or update django files"));
    assert!(body.ends_with("## Tests\n_Not provided_\n"));
  }

  #[test]
  fn tail_keeps_last_chars() {
    assert_eq!(tail("abcdef", 3), "def");
    assert_eq!(tail("ab", 3), "ab");
    assert_eq!(tail("日本語テキスト", 2), "スト");
  }

  #[test]
  fn fix_prompt_without_failures() {
    let body = fix_prompt_body("PROJ-1", &RunReport::default(), "");
    assert!(body.starts_with("# PROJ-1: No failing tests detected."));
  }

  #[test]
  fn fix_prompt_lists_failures() {
    let report = RunReport {
      totals: None,
      cases: vec![
        RawResultCase::new("test_tc_001", CaseStatus::Passed, 0.1, ""),
        RawResultCase::new("test_tc_002", CaseStatus::Error, 0.1, &format!("{}\ntrace", "x".repeat(400))),
      ],
    };
    let body = fix_prompt_body("PROJ-1", &report, &"r".repeat(5000));
    assert!(body.contains("## Failing tests (first line)"));
    assert!(body.contains(&format!("- test_tc_002 - ERROR: {}…", "x".repeat(300))));
    assert!(!body.contains("test_tc_001"));
    assert!(body.contains(&format!("```text\n{}\n```", "r".repeat(4000))));
    assert!(!body.contains(&"r".repeat(4001)));
    assert!(body.ends_with("keep changes minimal and focused."));
  }
}
