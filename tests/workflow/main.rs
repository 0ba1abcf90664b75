use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use devflow::config::{Config, FieldKeys};
use devflow::report::format::{chunk, comment_parts, tc_table};
use devflow::results::aggregate::aggregate;
use devflow::results::junit::parse_junit;
use devflow::testcase::id::CanonicalId;
use devflow::testcase::parse::resolve_test_cases;
use devflow::testcase::stub::{ensure_stubs, stub_path};
use devflow::ticket::fields::extract_fields;

fn issue() -> serde_json::Value {
  json!({
    "key": "SHOP-42",
    "fields": {
      "summary": "Contact form",
      "issuetype": {"name": "Story"},
      "description": {
        "type": "doc",
        "version": 1,
        "content": [
          {"type": "paragraph", "content": [{"type": "text", "text": "User Story\nAs a visitor I can send a message.\n"}]},
          {"type": "paragraph", "content": [{"type": "text", "text": "Acceptance Criteria\n- name is required\n"}]},
          {"type": "paragraph", "content": [
            {"type": "text", "text": "### Test Cases\n"},
            {"type": "text", "text": "ID | Scenario | Steps | Expected\n"},
            {"type": "text", "text": "TC-1 | Form renders | open /contact | fields visible\n"},
            {"type": "text", "text": "tc_02 | Name required | submit empty | error shown\n"}
          ]}
        ]
      }
    }
  })
}

const JUNIT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites>
  <testsuite name="pytest" tests="4" failures="1" errors="0" skipped="0">
    <testcase classname="tests.SHOP-42.test_shop_42_tc_001" name="test_tc_001" time="0.2"/>
    <testcase classname="tests.SHOP-42.test_shop_42_tc_002" name="test_tc_002[empty]" time="0.3">
      <failure message="AssertionError: no error shown">assert resp.status_code == 400</failure>
    </testcase>
    <testcase classname="tests.SHOP-42.test_shop_42_tc_002" name="test_tc_002[blank]" time="0.4"/>
    <testcase classname="tests.test_smoke" name="test_app_boots" time="0.1"/>
  </testsuite>
</testsuites>"#;

#[test]
fn ticket_to_stubs() {
  let fields = extract_fields(&issue(), &FieldKeys::default());
  assert_eq!(fields.acceptance, "- name is required");

  let cases = resolve_test_cases(&fields.tests, &fields.description);
  let ids: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
  assert_eq!(ids, vec!["TC-001", "TC-002"]);
  assert_eq!(cases[1].expected, "error shown");

  let tmp = TempDir::new().unwrap();
  let config = Config::for_root(tmp.path());
  assert_eq!(ensure_stubs(&config.tests_root(), "SHOP-42", &cases).unwrap(), 2);
  assert_eq!(ensure_stubs(&config.tests_root(), "SHOP-42", &cases).unwrap(), 0);

  let stub = stub_path(&config.tests_root(), "SHOP-42", &CanonicalId::normalize("TC-2"));
  let source = std::fs::read_to_string(stub).unwrap();
  assert!(source.contains("def test_tc_002():"));
  assert!(source.contains("Name required\nsubmit empty\nerror shown"));
}

#[test]
fn results_to_report() {
  let report = parse_junit(JUNIT).unwrap();
  let totals = report.totals.unwrap();
  assert_eq!((totals.tests, totals.passed), (4, 3));

  let agg = aggregate(&report.cases);
  assert_eq!(agg.len(), 2);

  let tc2 = &agg[&CanonicalId::normalize("TC-002")];
  assert!((tc2.elapsed_seconds - 0.7).abs() < 1e-9);

  let table = tc_table("SHOP-42", report.totals.as_ref(), &agg);
  assert_eq!(
    table,
    "Unit Test Summary for SHOP-42: 3 passed, 1 failed, 0 errors, 0 skipped, total 4.\n\
     \n\
     Test case | test status | time (s) | remarks\n\
     ---|---|---:|---\n\
     TC-001 | Pass | 0.200 | \n\
     TC-002 | Fail | 0.700 | AssertionError: no error shown"
  );
}

#[test]
fn long_reports_are_split_losslessly() {
  let body = "TC-001 | Pass | 0.100 | ok\n".repeat(2000);
  let parts = comment_parts(&body, None, 24_000);
  assert_eq!(parts.len(), 3);
  assert_eq!(parts[2].title.as_deref(), Some("DevFlow (part 3)"));
  assert_eq!(parts.iter().map(|p| p.body).collect::<String>(), body);
  assert!(chunk(&body, 24_000).iter().all(|c| c.chars().count() <= 24_000));
}
