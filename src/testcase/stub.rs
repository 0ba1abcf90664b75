use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::id::{snake, CanonicalId};
use super::parse::TestCaseRecord;
use crate::error::Result;

/// `<tests_root>/<ISSUE>/test_<issue>_<tc_nnn>.py`. The issue key is part of the file name so
/// modules of different issues never collide on import.
pub fn stub_path(tests_root: &Path, issue_key: &str, id: &CanonicalId) -> PathBuf {
  tests_root
    .join(issue_key)
    .join(format!("test_{}_{}.py", snake(issue_key), id.file_stem()))
}

pub fn stub_source(record: &TestCaseRecord) -> String {
  let doc = [&record.scenario, &record.steps, &record.expected]
    .iter()
    .filter(|s| !s.is_empty())
    .map(|s| s.as_str())
    .collect::<Vec<_>>()
    .join("\n");

  format!(
    "import pytest\n\n\ndef test_{func}():\n    \"\"\"{doc}\n    \"\"\"\n    assert True\n",
    func = record.id.file_stem(),
    doc = escape_docstring(&doc),
  )
}

fn escape_docstring(s: &str) -> String {
  s.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
}

/// Make sure one stub exists per test case. Existing files are never touched, so hand edits
/// survive. Returns the number of files written by this call.
pub fn ensure_stubs(tests_root: &Path, issue_key: &str, cases: &[TestCaseRecord]) -> Result<usize> {
  let dir = tests_root.join(issue_key);
  std::fs::create_dir_all(&dir)?;

  let mut written = 0;
  for case in cases {
    let path = stub_path(tests_root, issue_key, &case.id);
    let file = std::fs::OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(&path);

    match file {
      Ok(mut f) => {
        f.write_all(stub_source(case).as_bytes())?;
        debug!("wrote stub: {}", path.display());
        written += 1;
      }
      Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
        debug!("stub exists, skipping: {}", path.display());
      }
      Err(e) => return Err(e.into()),
    }
  }

  info!("{issue_key}: {written} new stub(s), {} total", cases.len());
  Ok(written)
}
