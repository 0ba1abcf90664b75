//! Rich-text (Atlassian document format) helpers: flattening tracker documents to plain text,
//! and building the small documents we post back as comments.

use serde_json::{json, Value};

/// Shape of a rich-text node as far as flattening cares.
#[derive(Debug, Clone, PartialEq)]
pub enum AdfNode {
  Text(String),
  Container {
    text: Option<String>,
    content: Vec<AdfNode>,
  },
  Sequence(Vec<AdfNode>),
  Other,
}

impl From<&Value> for AdfNode {
  fn from(value: &Value) -> Self {
    match value {
      Value::String(s) => AdfNode::Text(s.clone()),
      Value::Array(items) => AdfNode::Sequence(items.iter().map(AdfNode::from).collect()),
      Value::Object(map) => {
        let text = match map.get("text") {
          None | Some(Value::Null) => None,
          Some(Value::String(s)) => Some(s.clone()),
          Some(_) => return AdfNode::Other,
        };
        let content = match map.get("content") {
          None | Some(Value::Null) => Vec::new(),
          Some(Value::Array(items)) => items.iter().map(AdfNode::from).collect(),
          Some(_) => return AdfNode::Other,
        };
        AdfNode::Container { text, content }
      }
      _ => AdfNode::Other,
    }
  }
}

impl AdfNode {
  /// Depth-first, pre-order concatenation of every text value. No separators are inserted.
  pub fn flatten(&self) -> String {
    let mut out = String::new();
    self.flatten_into(&mut out);
    out
  }

  fn flatten_into(&self, out: &mut String) {
    match self {
      AdfNode::Text(s) => out.push_str(s),
      AdfNode::Container { text, content } => {
        if let Some(t) = text {
          out.push_str(t);
        }
        for child in content {
          child.flatten_into(out);
        }
      }
      AdfNode::Sequence(items) => {
        for item in items {
          item.flatten_into(out);
        }
      }
      AdfNode::Other => {}
    }
  }
}

/// Flatten an optional JSON value. Absent, null and unrecognised shapes yield "".
pub fn flatten(value: Option<&Value>) -> String {
  value.map(|v| AdfNode::from(v).flatten()).unwrap_or_default()
}

pub fn paragraph(text: &str) -> Value {
  json!({"type": "paragraph", "content": [{"type": "text", "text": text}]})
}

pub fn code_block(text: &str) -> Value {
  json!({
    "type": "codeBlock",
    "attrs": {"language": "text"},
    "content": [{"type": "text", "text": text}],
  })
}

pub fn table(headers: &[&str], rows: &[Vec<String>]) -> Value {
  let cell = |t: &str| json!({"type": "tableCell", "content": [paragraph(t)]});
  let mut content = vec![json!({
    "type": "tableRow",
    "content": headers.iter().map(|h| cell(h)).collect::<Vec<_>>(),
  })];
  for row in rows {
    content.push(json!({
      "type": "tableRow",
      "content": row.iter().map(|c| cell(c)).collect::<Vec<_>>(),
    }));
  }
  json!({"type": "table", "content": content})
}

pub fn doc(blocks: Vec<Value>) -> Value {
  json!({"type": "doc", "version": 1, "content": blocks})
}

/// A document holding one code block, optionally preceded by a title paragraph.
pub fn code_doc(text: &str, title: Option<&str>) -> Value {
  let mut blocks = Vec::new();
  if let Some(title) = title {
    blocks.push(paragraph(title));
  }
  blocks.push(code_block(text));
  doc(blocks)
}
