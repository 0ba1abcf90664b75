use std::path::Path;
use std::process::{Command, Output};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::GitConfig;
use crate::error::{DevflowError, Result};

const SLUG_MAX_CHARS: usize = 80;
const STASH_PREFIX: &str = "auto-stash-before-";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]+").expect("valid regex"));
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").expect("valid regex"));

pub fn slug(s: &str) -> String {
    let lower = s.to_lowercase();
    let s = WHITESPACE.replace_all(&lower, "-");
    let s = NON_SLUG.replace_all(&s, "-");
    let s = DASHES.replace_all(&s, "-");
    s.trim_matches('-').chars().take(SLUG_MAX_CHARS).collect()
}

/// `<type>/<KEY>-<title>`, e.g. `story/PROJ-12-contact-form`.
pub fn branch_name(issue_type: &str, key: &str, title: &str) -> String {
    format!("{}/{key}-{}", slug(issue_type), slug(title))
}

fn git(repo_path: &Path, args: &[&str]) -> Result<Output> {
    debug!("git {}", args.join(" "));
    Ok(Command::new("git").args(args).current_dir(repo_path).output()?)
}

fn git_ok(repo_path: &Path, args: &[&str], what: &str) -> Result<Output> {
    let output = git(repo_path, args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DevflowError::Git(format!("{what} failed: {stderr}")));
    }
    Ok(output)
}

pub fn is_repo(repo_path: &Path) -> bool {
    git(repo_path, &["rev-parse", "--is-inside-work-tree"]).is_ok_and(|o| o.status.success())
}

pub fn current_branch(repo_path: &Path) -> Result<String> {
    let output = git_ok(repo_path, &["rev-parse", "--abbrev-ref", "HEAD"], "rev-parse")?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Switch to a fresh work branch for the issue, cut from the remote base when it can be fetched
/// and from the local base otherwise. Uncommitted work is carried over through a stash.
pub fn create_branch(repo_path: &Path, git_config: &GitConfig, key: &str, title: &str, issue_type: &str) -> Result<String> {
    let branch = branch_name(issue_type, key, title);

    if !is_repo(repo_path) {
        return Err(DevflowError::Git(
            "not a git repository. Run: git init && git remote add origin <url>".into(),
        ));
    }

    info!("preparing branch {branch}");

    git(repo_path, &["add", "-A"])?;
    git(
        repo_path,
        &["stash", "--include-untracked", "-m", &format!("{STASH_PREFIX}{branch}")],
    )?;

    let remote = &git_config.remote;
    let base = &git_config.base_branch;
    let fetch = git(repo_path, &["fetch", remote, base])?;
    if !fetch.status.success() {
        warn!("git fetch {remote} {base} failed, using local {base}");
    }

    let remote_ref = format!("{remote}/{base}");
    let has_remote_ref = git(
        repo_path,
        &["show-ref", "--verify", &format!("refs/remotes/{remote_ref}")],
    )?
    .status
    .success();
    let base_ref = if has_remote_ref { remote_ref } else { base.clone() };

    git_ok(
        repo_path,
        &["checkout", "-B", &branch, &base_ref],
        &format!("checkout -B {branch} {base_ref}"),
    )?;

    let stashes = git(repo_path, &["stash", "list"])?;
    if String::from_utf8_lossy(&stashes.stdout).contains(STASH_PREFIX) {
        if !git(repo_path, &["stash", "pop"])?.status.success() {
            warn!("stash pop failed; changes remain in the stash");
        }
    }

    git(
        repo_path,
        &["commit", "--allow-empty", "-m", &format!("chore({key}): start {branch}")],
    )?;

    info!("switched to {branch}");
    Ok(branch)
}

/// Stage everything and commit as `feat(<KEY>): <message>`.
pub fn commit(repo_path: &Path, key: &str, message: &str) -> Result<()> {
    git_ok(repo_path, &["add", "-A"], "add")?;
    git_ok(
        repo_path,
        &["commit", "-m", &format!("feat({key}): {message}")],
        "commit",
    )?;
    info!("committed feat({key})");
    Ok(())
}

/// Open a pull request for the current branch through the GitHub CLI.
pub fn open_pr(repo_path: &Path) -> Result<()> {
    let branch = current_branch(repo_path)?;
    info!("opening pull request for {branch}");

    let output = Command::new("gh")
        .args(["pr", "create", "--fill", "--head", &branch])
        .current_dir(repo_path)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DevflowError::NotFound("gh CLI not found".into()),
            _ => DevflowError::Io(e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DevflowError::Process(format!("gh pr create failed: {stderr}")));
    }

    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !url.is_empty() {
        info!("pull request: {url}");
    }
    Ok(())
}
