use serde::Serialize;
use serde_json::{Map, Value};

use super::adf;
use super::sections::{extract_section, Section};
use crate::config::FieldKeys;

/// The parts of a ticket the workflow cares about, all as plain text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketFields {
  pub summary: String,
  pub description: String,
  pub acceptance: String,
  pub tests: String,
  pub issue_type: String,
}

/// Rich-text values are flattened; plain strings pass through.
fn text_of(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Object(_) | Value::Array(_) => adf::flatten(Some(value)),
    _ => String::new(),
  }
}

fn from_keys(fields: &Map<String, Value>, keys: &[String]) -> String {
  keys
    .iter()
    .find_map(|k| fields.get(k))
    .map(text_of)
    .unwrap_or_default()
}

fn from_names(fields: &Map<String, Value>, matches: impl Fn(&str) -> bool) -> String {
  fields
    .iter()
    .filter(|(k, _)| matches(&k.to_lowercase()))
    .map(|(_, v)| text_of(v))
    .find(|s| !s.is_empty())
    .unwrap_or_default()
}

fn is_acceptance_field(name: &str) -> bool {
  name.contains("acceptance") || name.ends_with("criteria")
}

fn is_tests_field(name: &str) -> bool {
  name.contains("test case") || name.contains("testcases") || name.ends_with("tests")
}

/// Pull summary, description, acceptance criteria and test cases out of an issue payload.
///
/// Acceptance and tests come from the configured custom fields first, then from any field whose
/// name looks right, and finally from sections of the description.
pub fn extract_fields(issue: &Value, keys: &FieldKeys) -> TicketFields {
  let empty = Map::new();
  let fields = issue
    .get("fields")
    .and_then(Value::as_object)
    .unwrap_or(&empty);

  let summary = fields
    .get("summary")
    .and_then(Value::as_str)
    .unwrap_or("")
    .trim()
    .to_string();
  let description = fields.get("description").map(text_of).unwrap_or_default();
  let issue_type = fields
    .get("issuetype")
    .and_then(|t| t.get("name"))
    .and_then(Value::as_str)
    .unwrap_or("task")
    .to_string();

  let mut acceptance = from_keys(fields, &keys.acceptance);
  if acceptance.is_empty() {
    acceptance = from_names(fields, is_acceptance_field);
  }
  if acceptance.is_empty() {
    acceptance = extract_section(&description, Section::Acceptance);
  }

  let mut tests = from_keys(fields, &keys.tests);
  if tests.is_empty() {
    tests = from_names(fields, is_tests_field);
  }
  if tests.is_empty() {
    tests = extract_section(&description, Section::Tests);
  }

  TicketFields {
    summary,
    description,
    acceptance,
    tests,
    issue_type,
  }
}
