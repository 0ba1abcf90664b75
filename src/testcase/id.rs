use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `TC` marker, optional separator, digit run. Matches anywhere in the input.
static TC_MARKER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)tc[-_ ]?(\d+)").expect("valid regex"));

/// Same marker, but not glued to a preceding letter or digit, so `etc-5` or `abtc1` do not
/// count. `_` is accepted as a boundary because test function names are snake case.
static TC_IN_TEST_NAME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?i)(?:^|[^a-z0-9])tc[-_ ]?(\d+)").expect("valid regex"));

/// Canonical test-case identifier, `TC-<digits>` with at least three digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(String);

impl CanonicalId {
  /// Normalize any spelling. Input without a `TC<digits>` marker passes through uppercased.
  pub fn normalize(raw: &str) -> Self {
    match TC_MARKER.captures(raw) {
      Some(caps) => Self::from_digits(&caps[1]),
      None => Self::verbatim(raw),
    }
  }

  /// The trimmed input uppercased, with no marker search. Buckets results that carry no id.
  pub fn verbatim(raw: &str) -> Self {
    CanonicalId(raw.trim().to_uppercase())
  }

  /// Derive an id from a test result's name and class name. `None` when neither carries one.
  pub fn from_case(name: &str, class_name: &str) -> Option<Self> {
    [name, class_name]
      .iter()
      .find_map(|s| TC_IN_TEST_NAME.captures(s))
      .map(|caps| Self::from_digits(&caps[1]))
  }

  fn from_digits(digits: &str) -> Self {
    CanonicalId(format!("TC-{digits:0>3}"))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// `tc_001`: lowercase with separators folded to underscores, for file and function names.
  pub fn file_stem(&self) -> String {
    snake(&self.0)
  }
}

/// Lowercase, with every run of non-alphanumerics folded to a single `_`.
pub(crate) fn snake(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if c.is_ascii_alphanumeric() {
      out.push(c.to_ascii_lowercase());
    } else if !out.ends_with('_') {
      out.push('_');
    }
  }
  out.trim_matches('_').to_string()
}

impl fmt::Display for CanonicalId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for CanonicalId {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn separator_and_case_invariance() {
    for raw in ["tc-1", "TC_001", "tc 001", "TC1", "tc_01", "TC-001", "Tc001"] {
      assert_eq!(CanonicalId::normalize(raw).as_str(), "TC-001", "{raw}");
    }
  }

  #[test]
  fn long_digit_runs_are_kept() {
    assert_eq!(CanonicalId::normalize("TC-12345").as_str(), "TC-12345");
    assert_eq!(CanonicalId::normalize("tc_0001").as_str(), "TC-0001");
  }

  #[test]
  fn normalization_is_idempotent() {
    for raw in ["tc-7", "see TC_42 here", "TC-1000", "no id at all", "weird-Name"] {
      let once = CanonicalId::normalize(raw);
      let twice = CanonicalId::normalize(once.as_str());
      assert_eq!(once, twice, "{raw}");
    }
  }

  #[test]
  fn passthrough_is_uppercased() {
    assert_eq!(CanonicalId::normalize("test_login").as_str(), "TEST_LOGIN");
  }

  #[test]
  fn from_case_reads_snake_case_test_names() {
    assert_eq!(
      CanonicalId::from_case("test_tc_001_a", "").unwrap().as_str(),
      "TC-001"
    );
    assert_eq!(
      CanonicalId::from_case("test_login", "tests.PROJ-1.test_proj_1_tc_12").unwrap().as_str(),
      "TC-012"
    );
    assert_eq!(CanonicalId::from_case("TC3", "").unwrap().as_str(), "TC-003");
  }

  #[test]
  fn from_case_prefers_name_over_class() {
    let id = CanonicalId::from_case("test_tc_002", "tests.test_proj_1_tc_001").unwrap();
    assert_eq!(id.as_str(), "TC-002");
  }

  #[test]
  fn from_case_rejects_embedded_markers() {
    assert!(CanonicalId::from_case("test_login", "tests.test_forms").is_none());
    assert!(CanonicalId::from_case("test_etc5", "").is_none());
    assert!(CanonicalId::from_case("", "").is_none());
  }

  #[test]
  fn file_stem_is_snake_case() {
    assert_eq!(CanonicalId::normalize("TC-001").file_stem(), "tc_001");
    assert_eq!(snake("PROJ-12"), "proj_12");
    assert_eq!(snake("a--b  c"), "a_b_c");
  }

  #[test]
  fn ids_sort_lexicographically() {
    let mut ids = vec![
      CanonicalId::normalize("TC-010"),
      CanonicalId::normalize("TC-2"),
      CanonicalId::normalize("TC-001"),
    ];
    ids.sort();
    let sorted: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
    assert_eq!(sorted, vec!["TC-001", "TC-002", "TC-010"]);
  }
}
