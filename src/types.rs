use serde::Serialize;
use serde_json::Value;

use crate::path::KeyPath;

/// A key whose name contained the search term, with its value captured at search time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub path: KeyPath,
    pub value: Value,
}

impl Match {
    pub fn key(&self) -> Option<&str> {
        self.path.last_key()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,             // display path, e.g. ".items[0].id"
    pub key: Option<String>,      // matched member name
    pub value_type: &'static str, // "object" | "array" | "string" | "number" | ...
    pub child_count: usize,
    pub preview: String,          // short preview for leafs / strings / numbers
    pub value: Value,
}

impl From<Match> for SearchHit {
    fn from(m: Match) -> Self {
        let preview = preview(&m.value, Some(PREVIEW_LIMIT));
        Self {
            path: m.path.to_string(),
            key: m.key().map(str::to_string),
            value_type: value_type(&m.value),
            child_count: child_count(&m.value),
            preview,
            value: m.value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total_count: usize,
    pub has_more: bool,
}

impl SearchResponse {
    pub fn page(matches: Vec<Match>, offset: usize, limit: usize) -> Self {
        let total_count = matches.len();
        let results = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(SearchHit::from)
            .collect();
        let has_more = offset.saturating_add(limit) < total_count;
        Self { results, total_count, has_more }
    }
}

/// Results for one stored document in a multi-document search.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMatches {
    pub document: String,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileListing {
    pub files: Vec<String>,
}

const PREVIEW_LIMIT: usize = 120;

pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…", &s[..cut]),
    }
}

pub fn value_type(v: &Value) -> &'static str {
    match v {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

pub fn child_count(v: &Value) -> usize {
    match v {
        Value::Object(m) => m.len(),
        Value::Array(a) => a.len(),
        _ => 0,
    }
}

pub fn preview(v: &Value, truncate_limit: Option<usize>) -> String {
    match v {
        Value::Object(m) if m.is_empty() => "{} 0 keys".to_string(),
        Value::Object(m) => format!("{{…}} {} keys", m.len()),
        Value::Array(a) if a.is_empty() => "[] 0 items".to_string(),
        Value::Array(a) => format!("[…] {} items", a.len()),
        Value::String(s) => match truncate_limit {
            Some(limit) => truncate(s, limit),
            None => s.clone(),
        },
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".into(),
    }
}
