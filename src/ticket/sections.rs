use std::sync::LazyLock;

use regex::Regex;

/// Sections we know how to pull out of a free-form ticket description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
  Acceptance,
  Tests,
}

impl Section {
  pub const ALL: [Section; 2] = [Section::Acceptance, Section::Tests];

  /// Heading spellings (regex fragments) accepted on a line of their own.
  pub fn headings(self) -> &'static [&'static str] {
    match self {
      Section::Acceptance => &[r"acceptance\s*criteria?", r"\bAC\b"],
      Section::Tests => &[r"test\s*cases?", r"\btests?\b"],
    }
  }

  /// Phrase searched anywhere in the text when no heading is present.
  pub fn inline_token(self) -> &'static str {
    match self {
      Section::Acceptance => r"acceptance\s*criteria",
      Section::Tests => r"test\s*cases",
    }
  }
}

static NEXT_HEADING: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*\w").expect("valid regex"));

/// Extract one known section from `text`, trimmed. Empty when absent.
pub fn extract_section(text: &str, section: Section) -> String {
  let others: Vec<&str> = Section::ALL
    .iter()
    .filter(|s| **s != section)
    .map(|s| s.inline_token())
    .collect();
  extract(text, section.headings(), Some(section.inline_token()), &others)
}

/// Two-tier extraction: a heading line first, then an inline token anywhere in the text.
///
/// With a heading, the section ends at the next markdown heading (`#` + word) or end of text.
/// With an inline token, it ends at the first later occurrence of any of `other_tokens`, and the
/// label itself is dropped.
pub fn extract(text: &str, headings: &[&str], token: Option<&str>, other_tokens: &[&str]) -> String {
  if text.is_empty() || headings.is_empty() {
    return String::new();
  }

  let alternation = headings.join("|");
  let Ok(heading_re) = Regex::new(&format!(
    r"(?im)^[ \t]*(?:#{{1,6}}[ \t]*)?(?:{alternation})[ \t]*[:\-]*[ \t]*\r?\n"
  )) else {
    return String::new();
  };

  if let Some(m) = heading_re.find(text) {
    let rest = &text[m.end()..];
    let end = NEXT_HEADING.find(rest).map(|n| n.start()).unwrap_or(rest.len());
    return rest[..end].trim().to_string();
  }

  let Some(token) = token else {
    return String::new();
  };
  let Some(found) = find_token(text, token) else {
    return String::new();
  };

  let end = other_tokens
    .iter()
    .filter_map(|t| find_token(text, t))
    .map(|(start, _)| start)
    .filter(|pos| *pos > found.0)
    .min()
    .unwrap_or(text.len());

  let slice = &text[found.0..end];
  let body = match slice.split_once('\n') {
    Some((_label, rest)) => rest,
    // No line structure: drop just the matched label.
    None => &text[found.1.min(end)..end],
  };
  body.trim().to_string()
}

fn find_token(text: &str, token: &str) -> Option<(usize, usize)> {
  let re = Regex::new(&format!("(?i){token}")).ok()?;
  re.find(text).map(|m| (m.start(), m.end()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn no_sections_yields_empty() {
    assert_eq!(extract("no sections here", &["acceptance criteria"], None, &[]), "");
    assert_eq!(extract_section("no sections here", Section::Acceptance), "");
  }

  #[test]
  fn markdown_heading_section_runs_to_next_heading() {
    let text = "# Story\nAs a user...\n\n## Acceptance Criteria:\n- form shows\n- errors shown\n\n## Test Cases\nTC-001\n";
    assert_eq!(
      extract_section(text, Section::Acceptance),
      "- form shows\n- errors shown"
    );
    assert_eq!(extract_section(text, Section::Tests), "TC-001");
  }

  #[test]
  fn plain_heading_line_is_recognised() {
    let text = "Intro\nTest cases\nTC-001 | a | b | c\n";
    assert_eq!(extract_section(text, Section::Tests), "TC-001 | a | b | c");
  }

  #[test]
  fn short_ac_heading() {
    let text = "Overview\nAC:\nmust validate name\n# Notes\nignored";
    assert_eq!(extract_section(text, Section::Acceptance), "must validate name");
  }

  #[test]
  fn inline_token_fallback_drops_label_line() {
    let text = "User story text. Acceptance Criteria\nName required\nPrice numeric\nTest Cases\nTC-001\nVerify";
    assert_eq!(
      extract_section(text, Section::Acceptance),
      "Name required\nPrice numeric"
    );
    assert_eq!(extract_section(text, Section::Tests), "TC-001\nVerify");
  }

  #[test]
  fn inline_token_fallback_on_minified_text() {
    let text = "User StoryAs a userAcceptance CriteriaForm FieldsTest CasesTC-001Verify layoutTC-002Validate";
    assert_eq!(extract_section(text, Section::Acceptance), "Form Fields");
    assert_eq!(
      extract_section(text, Section::Tests),
      "TC-001Verify layoutTC-002Validate"
    );
  }

  #[test]
  fn heading_takes_precedence_over_inline_token() {
    let text = "mentions test cases inline\n## Tests\nTC-003\n";
    assert_eq!(extract_section(text, Section::Tests), "TC-003");
  }
}
