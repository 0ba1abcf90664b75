use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{DevflowError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "devflow.yaml";

/// Process-wide settings, built once in `main` and passed down by reference.
#[derive(Debug)]
pub struct Config {
    pub root: PathBuf,
    pub jira: JiraConfig,
    pub git: GitConfig,
    pub fields: FieldKeys,
    pub settings: Settings,
}

#[derive(Debug, Default)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: Option<SecretString>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
}

/// Custom-field keys that carry acceptance criteria and test cases on the tracker side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldKeys {
    #[serde(default)]
    pub acceptance: Vec<String>,
    #[serde(default)]
    pub tests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_max_comment_chars")]
    pub max_comment_chars: usize,
    #[serde(default = "default_detail_max_chars")]
    pub detail_max_chars: usize,
    #[serde(default = "default_reason_max_chars")]
    pub reason_max_chars: usize,
    #[serde(default = "default_assistant_bin")]
    pub assistant_bin: String,
    #[serde(default = "default_assistant_timeout")]
    pub assistant_timeout_secs: u64,
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,
    #[serde(default = "default_tests_dir")]
    pub tests_dir: PathBuf,
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

/// On-disk shape of `devflow.yaml`. Credentials are never read from here.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    root: Option<PathBuf>,
    #[serde(default)]
    jira: JiraFile,
    #[serde(default)]
    git: Option<GitConfig>,
    #[serde(default)]
    fields: FieldKeys,
    #[serde(default)]
    settings: Option<Settings>,
}

#[derive(Debug, Default, Deserialize)]
struct JiraFile {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            base_branch: default_base_branch(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_comment_chars: default_max_comment_chars(),
            detail_max_chars: default_detail_max_chars(),
            reason_max_chars: default_reason_max_chars(),
            assistant_bin: default_assistant_bin(),
            assistant_timeout_secs: default_assistant_timeout(),
            test_command: default_test_command(),
            tests_dir: default_tests_dir(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

fn default_remote() -> String {
    "origin".to_string()
}
fn default_base_branch() -> String {
    "main".to_string()
}
fn default_max_comment_chars() -> usize {
    24_000
}
fn default_detail_max_chars() -> usize {
    9_000
}
fn default_reason_max_chars() -> usize {
    140
}
fn default_assistant_bin() -> String {
    "q".to_string()
}
fn default_assistant_timeout() -> u64 {
    900
}
fn default_test_command() -> Vec<String> {
    ["pytest", "-vv", "-rA", "--maxfail=0", "--color=no", "--durations=10"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_tests_dir() -> PathBuf {
    PathBuf::from("tests")
}
fn default_artifacts_dir() -> PathBuf {
    PathBuf::from(".q")
}

fn split_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Load configuration for the process: defaults, then the YAML file, then the environment
    /// (with `<root>/.env` applied first). An explicitly requested file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let root = std::env::var("REPO_ABS_PATH")
            .map(PathBuf::from)
            .unwrap_or(cwd);

        // Missing .env is fine; variables may already be exported.
        let _ = dotenvy::from_path(root.join(".env"));

        let path = match explicit {
            Some(p) if !p.exists() => return Err(DevflowError::ConfigNotFound(p.to_path_buf())),
            Some(p) => Some(p.to_path_buf()),
            None => Some(root.join(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        let file = match path {
            Some(p) => {
                let content = std::fs::read_to_string(&p)?;
                serde_yaml::from_str(&content)?
            }
            None => ConfigFile::default(),
        };

        let mut config = Self::from_file(file, root);
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults only, rooted at `root`.
    pub fn for_root(root: &Path) -> Self {
        Self::from_file(ConfigFile::default(), root.to_path_buf())
    }

    fn from_file(file: ConfigFile, root: PathBuf) -> Self {
        Self {
            root: file.root.unwrap_or(root),
            jira: JiraConfig {
                base_url: file.jira.base_url,
                email: file.jira.email,
                api_token: None,
            },
            git: file.git.unwrap_or_default(),
            fields: file.fields,
            settings: file.settings.unwrap_or_default(),
        }
    }

    /// Overlay environment values on top of file values.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REPO_ABS_PATH") {
            self.root = PathBuf::from(v);
        }
        if let Some(v) = get("JIRA_BASE_URL") {
            self.jira.base_url = v;
        }
        if let Some(v) = get("JIRA_EMAIL") {
            self.jira.email = v;
        }
        if let Some(v) = get("JIRA_API_TOKEN") {
            self.jira.api_token = Some(SecretString::from(v));
        }
        if let Some(v) = get("GIT_REMOTE") {
            self.git.remote = v;
        }
        if let Some(v) = get("BASE_BRANCH") {
            self.git.base_branch = v;
        }
        if let Some(v) = get("ACCEPTANCE_FIELD_KEYS") {
            self.fields.acceptance = split_keys(&v);
        }
        if let Some(v) = get("TESTS_FIELD_KEYS") {
            self.fields.tests = split_keys(&v);
        }
        if let Some(v) = get("Q_BIN") {
            self.settings.assistant_bin = v;
        }
        self.jira.base_url = self.jira.base_url.trim_end_matches('/').to_string();
    }

    fn validate(&self) -> Result<()> {
        if self.settings.max_comment_chars == 0 {
            return Err(DevflowError::Config(
                "max_comment_chars must be greater than zero".into(),
            ));
        }
        if self.settings.test_command.is_empty() {
            return Err(DevflowError::Config("test_command is empty".into()));
        }
        Ok(())
    }

    /// Every tracker setting that is missing, reported together.
    pub fn require_jira(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.jira.base_url.is_empty() {
            missing.push("JIRA_BASE_URL".to_string());
        }
        if self.jira.email.is_empty() {
            missing.push("JIRA_EMAIL".to_string());
        }
        if self.jira.api_token.is_none() {
            missing.push("JIRA_API_TOKEN".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DevflowError::MissingEnv(missing))
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join(&self.settings.artifacts_dir)
    }

    pub fn tests_root(&self) -> PathBuf {
        self.root.join(&self.settings.tests_dir)
    }

    pub fn artifact(&self, issue_key: &str, suffix: &str) -> PathBuf {
        self.artifacts_dir().join(format!("{issue_key}.{suffix}"))
    }

    pub fn junit_path(&self, issue_key: &str) -> PathBuf {
        self.artifact(issue_key, "junit.xml")
    }

    pub fn report_path(&self, issue_key: &str) -> PathBuf {
        self.artifact(issue_key, "tests.out.md")
    }

    pub fn ensure_artifacts_dir(&self) -> Result<PathBuf> {
        let dir = self.artifacts_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.max_comment_chars, 24_000);
        assert_eq!(settings.detail_max_chars, 9_000);
        assert_eq!(settings.reason_max_chars, 140);
        assert_eq!(settings.test_command[0], "pytest");
    }

    #[test]
    fn test_env_overlay() {
        let mut config = Config::for_root(Path::new("/tmp/repo"));
        let vars = env(&[
            ("JIRA_BASE_URL", "https://example.atlassian.net/"),
            ("JIRA_EMAIL", "dev@example.com"),
            ("JIRA_API_TOKEN", "secret"),
            ("BASE_BRANCH", "develop"),
            ("TESTS_FIELD_KEYS", "customfield_1, ,customfield_2"),
        ]);
        config.apply_env(|k| vars.get(k).cloned());

        assert_eq!(config.jira.base_url, "https://example.atlassian.net");
        assert_eq!(config.git.base_branch, "develop");
        assert_eq!(config.git.remote, "origin");
        assert_eq!(config.fields.tests, vec!["customfield_1", "customfield_2"]);
        assert!(config.require_jira().is_ok());
    }

    #[test]
    fn test_require_jira_lists_all_missing() {
        let config = Config::for_root(Path::new("/tmp/repo"));
        match config.require_jira() {
            Err(DevflowError::MissingEnv(missing)) => {
                assert_eq!(missing, vec!["JIRA_BASE_URL", "JIRA_EMAIL", "JIRA_API_TOKEN"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_artifact_paths() {
        let config = Config::for_root(Path::new("/tmp/repo"));
        assert_eq!(
            config.junit_path("PROJ-1"),
            PathBuf::from("/tmp/repo/.q/PROJ-1.junit.xml")
        );
        assert_eq!(config.tests_root(), PathBuf::from("/tmp/repo/tests"));
    }

    #[test]
    fn test_file_settings_parse() {
        let yaml = "git:\n  base_branch: trunk\nsettings:\n  max_comment_chars: 1000\n";
        let file: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        let config = Config::from_file(file, PathBuf::from("/tmp/repo"));
        assert_eq!(config.git.base_branch, "trunk");
        assert_eq!(config.git.remote, "origin");
        assert_eq!(config.settings.max_comment_chars, 1000);
        assert_eq!(config.settings.detail_max_chars, 9_000);
    }
}
