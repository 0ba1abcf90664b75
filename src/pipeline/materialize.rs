use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::Result;

static FILE_HEADER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)^#\s*file:\s*(?P<path>.+)$").expect("valid regex"));

/// A file announced by a `# file: <path>` line and the fenced block after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
  pub path: String,
  pub code: String,
}

/// Every `# file:` header followed by a fenced block. Prose between the header and the fence is
/// allowed; a header with no fence after it is ignored.
pub fn extract_files(markdown: &str) -> Vec<GeneratedFile> {
  let lines: Vec<&str> = markdown.lines().collect();
  let mut out = Vec::new();
  let mut pending: Option<String> = None;
  let mut i = 0;

  while i < lines.len() {
    let line = lines[i].trim();
    if let Some(caps) = FILE_HEADER.captures(line) {
      pending = Some(caps["path"].trim().to_string());
    } else if line.starts_with("```") {
      if let Some(path) = pending.take() {
        let mut code = Vec::new();
        i += 1;
        while i < lines.len() && !lines[i].starts_with("```") {
          code.push(lines[i]);
          i += 1;
        }
        out.push(GeneratedFile {
          path,
          code: code.join("\n"),
        });
      }
    }
    i += 1;
  }

  out
}

/// Relative path inside the repository, or `None` for absolute paths and `..` escapes.
fn safe_relative(path: &str) -> Option<PathBuf> {
  let p = Path::new(path);
  let ok = p
    .components()
    .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
  (ok && !path.is_empty()).then(|| p.to_path_buf())
}

/// Write the generated files under `root`. Returns how many were written.
pub fn materialize(markdown: &str, root: &Path) -> Result<usize> {
  let mut written = 0;
  for file in extract_files(markdown) {
    let Some(rel) = safe_relative(&file.path) else {
      warn!("refusing to write outside the repository: {}", file.path);
      continue;
    };
    let target = root.join(rel);
    if let Some(parent) = target.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, &file.code)?;
    info!("wrote {}", target.display());
    written += 1;
  }
  Ok(written)
}
