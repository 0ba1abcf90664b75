use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::assistant::runner::{AssistantOutput, CodeAssistant};
use crate::config::Config;
use crate::error::{DevflowError, Result};

/// Feed a prompt file to the assistant and store its transcript at `out_path`.
pub fn run_prompt_file<A: CodeAssistant + ?Sized>(
  assistant: &A,
  config: &Config,
  prompt_path: &Path,
  out_path: &Path,
) -> Result<AssistantOutput> {
  let prompt = std::fs::read_to_string(prompt_path).map_err(|_| {
    DevflowError::NotFound(format!(
      "Prompt not found: {}. Run `devflow prepare` first.",
      prompt_path.display()
    ))
  })?;

  let timeout = Duration::from_secs(config.settings.assistant_timeout_secs);
  let output = assistant.run_prompt(&prompt, &config.root, Some(timeout))?;

  if let Some(parent) = out_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(out_path, output.transcript())?;
  info!(
    "assistant finished with {}; transcript: {}",
    output.exit_code,
    out_path.display()
  );
  Ok(output)
}

/// `.q/<KEY>.prompt.md` → `.q/<KEY>.codegen.md`.
pub fn codegen<A: CodeAssistant + ?Sized>(assistant: &A, config: &Config, key: &str) -> Result<(AssistantOutput, PathBuf)> {
  let out = config.artifact(key, "codegen.md");
  let output = run_prompt_file(assistant, config, &config.artifact(key, "prompt.md"), &out)?;
  Ok((output, out))
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use tempfile::TempDir;

  use super::*;

  struct Recorder {
    prompts: RefCell<Vec<String>>,
  }

  impl CodeAssistant for Recorder {
    fn run_prompt(&self, prompt: &str, _cwd: &Path, timeout: Option<Duration>) -> Result<AssistantOutput> {
      assert_eq!(timeout, Some(Duration::from_secs(900)));
      self.prompts.borrow_mut().push(prompt.to_string());
      Ok(AssistantOutput {
        stdout: "# file: app.py\n```\nprint(1)\n```".into(),
        stderr: String::new(),
        exit_code: 2,
      })
    }
  }

  #[test]
  fn transcript_is_written_even_on_nonzero_exit() {
    let tmp = TempDir::new().unwrap();
    let config = Config::for_root(tmp.path());
    config.ensure_artifacts_dir().unwrap();
    std::fs::write(config.artifact("PROJ-1", "prompt.md"), "build it").unwrap();

    let rec = Recorder {
      prompts: RefCell::new(Vec::new()),
    };
    let (output, path) = codegen(&rec, &config, "PROJ-1").unwrap();
    assert_eq!(output.exit_code, 2);
    assert_eq!(rec.prompts.borrow().as_slice(), ["build it"]);
    assert!(std::fs::read_to_string(path).unwrap().contains("# file: app.py"));
  }

  #[test]
  fn missing_prompt_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let config = Config::for_root(tmp.path());
    let rec = Recorder {
      prompts: RefCell::new(Vec::new()),
    };
    assert!(matches!(
      codegen(&rec, &config, "PROJ-1"),
      Err(DevflowError::NotFound(_))
    ));
    assert!(rec.prompts.borrow().is_empty());
  }
}
