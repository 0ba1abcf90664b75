use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{DevflowError, Result};

/// What an assistant run produced. A non-zero exit is data, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantOutput {
  pub stdout: String,
  pub stderr: String,
  pub exit_code: i32,
}

impl AssistantOutput {
  /// Transcript written next to the prompt, in the shape the materializer reads.
  pub fn transcript(&self) -> String {
    format!(
      "## Q Invocation\n\n## Output\n{}\n\n## Errors\n{}\n",
      self.stdout, self.stderr
    )
  }
}

pub trait CodeAssistant {
  fn run_prompt(&self, prompt: &str, cwd: &Path, timeout: Option<Duration>) -> Result<AssistantOutput>;
}

/// Amazon Q developer CLI, driven non-interactively.
#[derive(Debug, Clone)]
pub struct QAssistant {
  bin: String,
}

impl QAssistant {
  pub fn new(bin: impl Into<String>) -> Self {
    Self { bin: bin.into() }
  }
}

impl CodeAssistant for QAssistant {
  fn run_prompt(&self, prompt: &str, cwd: &Path, timeout: Option<Duration>) -> Result<AssistantOutput> {
    info!("running {} chat in {}", self.bin, cwd.display());
    debug!("prompt length: {} chars", prompt.chars().count());

    let child = Command::new(&self.bin)
      .args(["chat", "--no-interactive", "--trust-all-tools", prompt])
      .current_dir(cwd)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| DevflowError::Assistant(format!("failed to launch {}: {e}", self.bin)))?;

    let output = match timeout {
      Some(dur) => wait_with_timeout(child, dur)?,
      None => child.wait_with_output()?,
    };

    let result = AssistantOutput {
      stdout: String::from_utf8_lossy(&output.stdout).to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      exit_code: output.status.code().unwrap_or(-1),
    };
    if result.exit_code != 0 {
      warn!("{} exited with {}", self.bin, result.exit_code);
    }
    debug!("assistant output length: {} bytes", result.stdout.len());
    Ok(result)
  }
}

/// Wait for `child`, killing it once `timeout` has passed. Pipes are drained on separate threads
/// so a chatty child cannot block on a full pipe.
pub fn wait_with_timeout(mut child: std::process::Child, timeout: Duration) -> Result<std::process::Output> {
  use std::io::Read;

  let stdout_pipe = child.stdout.take();
  let stderr_pipe = child.stderr.take();

  let stdout_handle = std::thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = stdout_pipe {
      let _ = pipe.read_to_end(&mut buf);
    }
    buf
  });

  let stderr_handle = std::thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = stderr_pipe {
      let _ = pipe.read_to_end(&mut buf);
    }
    buf
  });

  let start = std::time::Instant::now();
  let poll_interval = Duration::from_millis(200);

  loop {
    match child.try_wait()? {
      Some(status) => {
        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();
        return Ok(std::process::Output {
          status,
          stdout,
          stderr,
        });
      }
      None if start.elapsed() >= timeout => {
        warn!("process timed out after {}s, killing", timeout.as_secs());
        let _ = child.kill();
        let _ = child.wait();
        return Err(DevflowError::Timeout(format!(
          "timed out after {}s",
          timeout.as_secs()
        )));
      }
      None => std::thread::sleep(poll_interval),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transcript_has_output_and_errors() {
    let out = AssistantOutput {
      stdout: "# file: a.py\n```python\nx = 1\n```".into(),
      stderr: "warn".into(),
      exit_code: 0,
    };
    let t = out.transcript();
    assert!(t.starts_with("## Q Invocation\n\n## Output\n# file: a.py"));
    assert!(t.ends_with("## Errors\nwarn\n"));
  }

  #[test]
  fn missing_binary_is_a_launch_error() {
    let q = QAssistant::new("devflow-no-such-assistant-binary");
    let err = q
      .run_prompt("hi", Path::new("."), Some(Duration::from_secs(1)))
      .unwrap_err();
    assert!(matches!(err, DevflowError::Assistant(_)));
  }

  #[cfg(unix)]
  #[test]
  fn slow_process_times_out() {
    let child = Command::new("sleep")
      .arg("5")
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .unwrap();
    let err = wait_with_timeout(child, Duration::from_millis(300)).unwrap_err();
    assert!(matches!(err, DevflowError::Timeout(_)));
  }

  #[cfg(unix)]
  #[test]
  fn output_is_collected() {
    let child = Command::new("sh")
      .args(["-c", "echo out; echo err >&2; exit 3"])
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .unwrap();
    let output = wait_with_timeout(child, Duration::from_secs(10)).unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
    assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
  }
}
