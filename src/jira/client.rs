use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{DevflowError, Result};
use crate::report::format::{comment_parts, strip_ansi};
use crate::ticket::adf;

const ERROR_BODY_MAX_CHARS: usize = 500;

/// Jira Cloud REST v3 client. Holds the API token as a secret and exposes it only when a request
/// is built; it never appears in logs or `Debug` output.
#[derive(Debug)]
pub struct JiraClient {
  http: Client,
  base_url: String,
  email: String,
  token: SecretString,
}

impl JiraClient {
  pub fn from_config(config: &Config) -> Result<Self> {
    config.require_jira()?;
    let token = config
      .jira
      .api_token
      .as_ref()
      .map(|t| SecretString::from(t.expose_secret().to_string()))
      .ok_or_else(|| DevflowError::MissingEnv(vec!["JIRA_API_TOKEN".into()]))?;

    Ok(Self {
      http: Client::new(),
      base_url: config.jira.base_url.clone(),
      email: config.jira.email.clone(),
      token,
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{path}", self.base_url)
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    self
      .http
      .request(method, self.url(path))
      .basic_auth(&self.email, Some(self.token.expose_secret()))
      .header("Accept", "application/json")
  }

  async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
    info!("jira {method} {path}");
    let mut req = self.request(method.clone(), path);
    if let Some(body) = body {
      req = req.json(body);
    }

    let resp = req.send().await?;
    let status = resp.status();
    if status.as_u16() >= 300 {
      let text = resp.text().await.unwrap_or_default();
      return Err(status_error(&method, path, status.as_u16(), &text));
    }
    Ok(resp)
  }

  pub async fn get_issue(&self, key: &str) -> Result<Value> {
    let path = format!("/rest/api/3/issue/{key}?expand=renderedFields");
    let resp = self.send(Method::GET, &path, None).await?;
    Ok(resp.json().await?)
  }

  /// Post one comment whose body is a rich-text document.
  pub async fn add_comment(&self, key: &str, document: Value) -> Result<()> {
    let path = format!("/rest/api/3/issue/{key}/comment");
    self
      .send(Method::POST, &path, Some(&json!({ "body": document })))
      .await?;
    Ok(())
  }

  /// Post plain text as one or more code-block comments of at most `max_chars` characters each.
  /// Returns the number of comments posted.
  pub async fn post_chunked(&self, key: &str, body: &str, title: Option<&str>, max_chars: usize) -> Result<usize> {
    let clean = strip_ansi(body);
    let parts = comment_parts(&clean, title, max_chars);
    debug!("posting {} comment part(s) to {key}", parts.len());

    for part in &parts {
      self
        .add_comment(key, adf::code_doc(part.body, part.title.as_deref()))
        .await?;
    }
    Ok(parts.len())
  }
}

fn status_error(method: &Method, path: &str, status: u16, body: &str) -> DevflowError {
  let excerpt: String = body.chars().take(ERROR_BODY_MAX_CHARS).collect();
  DevflowError::Jira(format!("{method} {path} -> {status}: {excerpt}"))
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use super::*;

  fn config() -> Config {
    let mut config = Config::for_root(Path::new("/tmp/repo"));
    config.apply_env(|k| match k {
      "JIRA_BASE_URL" => Some("https://acme.atlassian.net/".into()),
      "JIRA_EMAIL" => Some("dev@acme.test".into()),
      "JIRA_API_TOKEN" => Some("s3cret".into()),
      _ => None,
    });
    config
  }

  #[test]
  fn missing_credentials_are_reported() {
    let err = JiraClient::from_config(&Config::for_root(Path::new("/tmp/repo"))).unwrap_err();
    assert!(matches!(err, DevflowError::MissingEnv(ref m) if m.len() == 3));
  }

  #[test]
  fn urls_join_without_double_slash() {
    let client = JiraClient::from_config(&config()).unwrap();
    assert_eq!(
      client.url("/rest/api/3/issue/PROJ-1"),
      "https://acme.atlassian.net/rest/api/3/issue/PROJ-1"
    );
  }

  #[test]
  fn token_never_shows_in_debug() {
    let client = JiraClient::from_config(&config()).unwrap();
    assert!(!format!("{client:?}").contains("s3cret"));
  }

  #[test]
  fn error_body_is_capped() {
    let err = status_error(&Method::POST, "/x", 400, &"e".repeat(2000));
    let msg = err.to_string();
    let prefix = "jira error: POST /x -> 400: ";
    assert!(msg.starts_with(prefix));
    assert_eq!(msg.len(), prefix.len() + 500);
  }
}
