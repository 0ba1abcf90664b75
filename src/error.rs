use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DevflowError {
  #[error("config error: {0}")]
  Config(String),

  #[error("config file not found: {0}")]
  ConfigNotFound(PathBuf),

  #[error("missing settings: {}. Put them in .env or devflow.yaml", .0.join(", "))]
  MissingEnv(Vec<String>),

  #[error("jira error: {0}")]
  Jira(String),

  #[error("git error: {0}")]
  Git(String),

  #[error("assistant execution error: {0}")]
  Assistant(String),

  #[error("process error: {0}")]
  Process(String),

  #[error("junit parse error: {0}")]
  Junit(String),

  #[error("timeout: {0}")]
  Timeout(String),

  #[error("{0}")]
  NotFound(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("yaml error: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("walk error: {0}")]
  Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, DevflowError>;
