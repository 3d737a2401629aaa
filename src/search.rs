use std::sync::Arc;

use rayon::prelude::*;
use serde_json::Value;
use thiserror::Error;

use crate::path::KeyPath;
use crate::types::{DocumentMatches, Match};

pub const DEFAULT_MAX_DEPTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Deepest container whose children are still visited. Root is depth 0.
    pub max_depth: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("document is nested deeper than the search limit of {limit} levels")]
    DepthLimitExceeded { limit: usize },
}

/// Find every object key containing `term`, case-insensitively.
///
/// Results come back in depth-first pre-order: a member's key is tested, then
/// its value is searched, then the next member. A matching key's subtree is
/// still searched. Array elements are descended into but never matched
/// themselves. An empty term matches every key.
pub fn search(document: &Value, term: &str) -> Result<Vec<Match>, SearchError> {
    search_with_limits(document, term, SearchLimits::default())
}

pub fn search_with_limits(
    document: &Value,
    term: &str,
    limits: SearchLimits,
) -> Result<Vec<Match>, SearchError> {
    let needle = term.to_lowercase();
    let mut results = Vec::new();
    let mut stack: Vec<(&Value, KeyPath)> = vec![(document, KeyPath::root())];

    while let Some((value, path)) = stack.pop() {
        if let Some(key) = path.last_key() {
            if key_matches(key, &needle) {
                results.push(Match { path: path.clone(), value: value.clone() });
            }
        }

        match value {
            Value::Object(map) => {
                if !map.is_empty() && path.depth() >= limits.max_depth {
                    return Err(SearchError::DepthLimitExceeded { limit: limits.max_depth });
                }
                // pushed in reverse so members pop in insertion order
                for (k, v) in map.iter().rev() {
                    stack.push((v, path.child_key(k)));
                }
            }
            Value::Array(items) => {
                if !items.is_empty() && path.depth() >= limits.max_depth {
                    return Err(SearchError::DepthLimitExceeded { limit: limits.max_depth });
                }
                for (idx, item) in items.iter().enumerate().rev() {
                    stack.push((item, path.child_index(idx)));
                }
            }
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null => {}
        }
    }

    Ok(results)
}

/// `needle` must already be lowercased.
pub fn key_matches(key: &str, needle: &str) -> bool {
    key.to_lowercase().contains(needle)
}

/// Search several documents in parallel, keeping the input order in the output.
/// Documents nested past the depth limit are skipped with a warning, the same
/// way the store skips files that fail to decode.
pub fn search_documents(
    documents: &[(String, Arc<Value>)],
    term: &str,
    limits: SearchLimits,
) -> Vec<DocumentMatches> {
    let started = std::time::Instant::now();
    let results: Vec<DocumentMatches> = documents
        .par_iter()
        .filter_map(|(name, doc)| match search_with_limits(doc, term, limits) {
            Ok(matches) => Some(DocumentMatches { document: name.clone(), matches }),
            Err(e) => {
                tracing::warn!(document = %name, error = %e, "skipping document");
                None
            }
        })
        .collect();

    tracing::debug!(
        documents = documents.len(),
        matches = results.iter().map(|r| r.matches.len()).sum::<usize>(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "multi-document search finished"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rows(matches: &[Match]) -> Vec<(String, Value)> {
        matches.iter().map(|m| (m.path.to_string(), m.value.clone())).collect()
    }

    #[test]
    fn nested_match_keeps_descending() {
        let doc = json!({"a": {"name": "x", "b": {"name": "y"}}});
        let found = search(&doc, "name").unwrap();
        assert_eq!(
            rows(&found),
            vec![(".a.name".to_string(), json!("x")), (".a.b.name".to_string(), json!("y"))]
        );
    }

    #[test]
    fn array_elements_are_indexed() {
        let doc = json!({"items": [{"id": 1}, {"id": 2}]});
        let found = search(&doc, "id").unwrap();
        assert_eq!(
            rows(&found),
            vec![(".items[0].id".to_string(), json!(1)), (".items[1].id".to_string(), json!(2))]
        );
    }

    #[test]
    fn matching_container_key_captures_whole_subtree() {
        let doc = json!({"user": {"username": "ada", "tags": ["x"]}});
        let found = search(&doc, "USER").unwrap();
        assert_eq!(
            rows(&found),
            vec![
                (".user".to_string(), json!({"username": "ada", "tags": ["x"]})),
                (".user.username".to_string(), json!("ada")),
            ]
        );
    }

    #[test]
    fn member_subtree_is_visited_before_next_sibling() {
        let doc = json!({"k1": {"k2": 1}, "k3": [{"k4": 2}], "k5": 3});
        let found = search(&doc, "k").unwrap();
        let paths: Vec<String> = found.iter().map(|m| m.path.to_string()).collect();
        assert_eq!(paths, vec![".k1", ".k1.k2", ".k3", ".k3[0].k4", ".k5"]);
    }

    #[test]
    fn case_insensitive_both_ways() {
        let doc = json!({"FirstName": "a", "lastname": "b", "nick": "c"});
        assert_eq!(search(&doc, "NAME").unwrap(), search(&doc, "name").unwrap());
        assert_eq!(search(&doc, "name").unwrap().len(), 2);
    }

    #[test]
    fn unicode_keys_fold_case() {
        let doc = json!({"ÉTAT": 1});
        assert_eq!(search(&doc, "état").unwrap().len(), 1);
    }

    #[test]
    fn no_match_is_empty() {
        assert!(search(&json!({"a": 1}), "zzz").unwrap().is_empty());
    }

    #[test]
    fn scalar_and_empty_roots_are_empty() {
        assert!(search(&json!(42), "x").unwrap().is_empty());
        assert!(search(&json!("hello"), "x").unwrap().is_empty());
        assert!(search(&json!(null), "x").unwrap().is_empty());
        assert!(search(&json!({}), "x").unwrap().is_empty());
        assert!(search(&json!([]), "x").unwrap().is_empty());
    }

    #[test]
    fn array_root_paths_start_with_index() {
        let doc = json!([{"id": 7}, [{"id": 8}]]);
        let found = search(&doc, "id").unwrap();
        assert_eq!(
            rows(&found),
            vec![("[0].id".to_string(), json!(7)), ("[1][0].id".to_string(), json!(8))]
        );
    }

    #[test]
    fn empty_term_matches_every_key() {
        let doc = json!({"a": {"b": 1}, "c": [{"d": null}]});
        let paths: Vec<String> = search(&doc, "")
            .unwrap()
            .iter()
            .map(|m| m.path.to_string())
            .collect();
        assert_eq!(paths, vec![".a", ".a.b", ".c", ".c[0].d"]);
    }

    #[test]
    fn matches_are_detached_from_source() {
        let mut doc = json!({"id": 1});
        let found = search(&doc, "id").unwrap();
        doc["id"] = json!(2);
        assert_eq!(found[0].value, json!(1));
    }

    #[test]
    fn depth_limit_is_reported() {
        let mut doc = json!(1);
        for _ in 0..10 {
            doc = json!({ "n": doc });
        }
        let limits = SearchLimits { max_depth: 5 };
        assert_eq!(
            search_with_limits(&doc, "n", limits),
            Err(SearchError::DepthLimitExceeded { limit: 5 })
        );
        assert_eq!(search_with_limits(&doc, "n", SearchLimits { max_depth: 10 }).unwrap().len(), 10);
    }

    #[test]
    fn deep_documents_do_not_overflow_the_stack() {
        let mut doc = json!([]);
        for _ in 0..20_000 {
            doc = Value::Array(vec![doc]);
        }
        let err = search(&doc, "x").unwrap_err();
        assert_eq!(err, SearchError::DepthLimitExceeded { limit: DEFAULT_MAX_DEPTH });
        // serde_json drops nested values recursively
        std::mem::forget(doc);
    }

    #[test]
    fn documents_are_searched_in_order() {
        let docs = vec![
            ("a.json".to_string(), Arc::new(json!({"id": 1}))),
            ("b.json".to_string(), Arc::new(json!({"other": 2}))),
            ("c.json".to_string(), Arc::new(json!([{"ID": 3}]))),
        ];
        let found = search_documents(&docs, "id", SearchLimits::default());
        let names: Vec<&str> = found.iter().map(|d| d.document.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.json", "c.json"]);
        assert_eq!(found[1].matches.len(), 0);
        assert_eq!(found[2].matches[0].path.to_string(), "[0].ID");
    }

    #[test]
    fn over_deep_documents_are_skipped_not_fatal() {
        let docs = vec![
            ("deep.json".to_string(), Arc::new(json!({"a": {"b": {"id": 1}}}))),
            ("flat.json".to_string(), Arc::new(json!({"id": 2}))),
        ];
        let found = search_documents(&docs, "id", SearchLimits { max_depth: 1 });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].document, "flat.json");
        assert_eq!(rows(&found[0].matches), vec![(".id".to_string(), json!(2))]);
    }
}
