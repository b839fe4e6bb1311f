//! Join Rewriter (C2).
//!
//! Walks a parsed query tree once, replacing `has_child` / `has_parent` /
//! `percolate` marker nodes with resolved `ids` queries. Because markers
//! carry their payload as explicit enum variants rather than through a
//! pointer-identity side table (spec §9), rewriting is a plain recursive
//! tree walk with no registration/unregistration bookkeeping, and is
//! idempotent by construction: once a marker becomes an `Ids` node there is
//! nothing left for a second pass to rewrite.

use std::collections::BTreeSet;

use crate::engine::{EngineSearchRequest, SearchEngine};
use crate::error::{Error, Result};

use super::ast::QueryNode;
use super::parser::parse_query;

/// A resolve set large enough that join resolution never silently truncates
/// within the fixture-sized indexes this system targets (spec has no stated
/// cap on id-set resolution).
const RESOLVE_ALL: usize = 1_000_000;

pub fn rewrite(node: QueryNode, index: &str, engine: &dyn SearchEngine) -> Result<QueryNode> {
    match node {
        QueryNode::HasChild { query, boost, .. } => {
            let inner = rewrite(*query, index, engine)?;
            let matched = search_all_ids(index, inner, engine)?;
            let parent_ids: BTreeSet<String> = matched
                .into_iter()
                .map(|id| id.split('#').next().unwrap_or(&id).to_string())
                .collect();
            Ok(QueryNode::Ids { values: parent_ids.into_iter().collect(), boost })
        }
        QueryNode::HasParent { query, boost, .. } => {
            let inner = rewrite(*query, index, engine)?;
            let parent_ids = search_all_ids(index, inner, engine)?;
            if parent_ids.is_empty() {
                return Ok(QueryNode::Ids { values: Vec::new(), boost });
            }
            let prefix_disjunction = QueryNode::Disjunction(
                parent_ids
                    .iter()
                    .map(|pid| QueryNode::Prefix { field: "_id".to_string(), value: pid.clone(), boost: 1.0 })
                    .collect(),
            );
            let child_ids = search_all_ids(index, prefix_disjunction, engine)?;
            Ok(QueryNode::Ids { values: child_ids, boost })
        }
        QueryNode::Percolate { field, index: stored_index, id, boost } => {
            let doc = engine
                .fetch_document(&stored_index, &id)?
                .ok_or_else(|| Error::DocumentNotFound { index: stored_index.clone(), id: id.clone() })?;
            let source = doc.source_json();
            let query_json = source
                .get(&field)
                .cloned()
                .ok_or_else(|| Error::MissingField(field.clone()))?;
            let resolved = parse_query(&query_json)?;
            rewrite(resolved, index, engine).map(|n| apply_boost(n, boost))
        }
        QueryNode::Bool { must, should, must_not, filter, boost } => Ok(QueryNode::Bool {
            must: rewrite_all(must, index, engine)?,
            should: rewrite_all(should, index, engine)?,
            must_not: rewrite_all(must_not, index, engine)?,
            filter: rewrite_all(filter, index, engine)?,
            boost,
        }),
        QueryNode::Conjunction(items) => Ok(QueryNode::Conjunction(rewrite_all(items, index, engine)?)),
        QueryNode::Disjunction(items) => Ok(QueryNode::Disjunction(rewrite_all(items, index, engine)?)),
        QueryNode::Nested { path, query, boost } => {
            Ok(QueryNode::Nested { path, query: Box::new(rewrite(*query, index, engine)?), boost })
        }
        other => Ok(other),
    }
}

fn rewrite_all(nodes: Vec<QueryNode>, index: &str, engine: &dyn SearchEngine) -> Result<Vec<QueryNode>> {
    nodes.into_iter().map(|n| rewrite(n, index, engine)).collect()
}

fn search_all_ids(index: &str, query: QueryNode, engine: &dyn SearchEngine) -> Result<Vec<String>> {
    let req = EngineSearchRequest { query, from: 0, size: RESOLVE_ALL, ..Default::default() };
    let result = engine.search(index, &req)?;
    Ok(result.hits.into_iter().map(|h| h.id).collect())
}

fn apply_boost(node: QueryNode, boost: f32) -> QueryNode {
    match node {
        QueryNode::Ids { values, .. } => QueryNode::Ids { values, boost },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;
    use crate::value::Document;
    use serde_json::json;

    fn engine_with_parent_child() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.create_index("docs");
        engine
            .index_document("docs", "p1", Document::from_source("docs", "p1", json!({"kind": "parent"})))
            .unwrap();
        engine
            .index_document(
                "docs",
                "p1#0",
                Document::from_source("docs", "p1#0", json!({"kind": "child", "text": "hello"})),
            )
            .unwrap();
        engine
    }

    #[test]
    fn has_child_rewrites_to_ids_over_parent_ids() {
        let engine = engine_with_parent_child();
        let node = QueryNode::HasChild {
            type_name: "comment".into(),
            query: Box::new(QueryNode::Term { field: "kind".into(), value: crate::value::Value::String("child".into()), boost: 1.0 }),
            boost: 2.0,
        };
        let rewritten = rewrite(node, "docs", &engine).unwrap();
        match rewritten {
            QueryNode::Ids { values, boost } => {
                assert_eq!(values, vec!["p1".to_string()]);
                assert_eq!(boost, 2.0);
            }
            other => panic!("expected ids, got {other:?}"),
        }
    }

    #[test]
    fn has_parent_rewrites_to_ids_over_child_ids() {
        let engine = engine_with_parent_child();
        let node = QueryNode::HasParent {
            type_name: "parent".into(),
            query: Box::new(QueryNode::Term { field: "kind".into(), value: crate::value::Value::String("parent".into()), boost: 1.0 }),
            boost: 1.0,
        };
        let rewritten = rewrite(node, "docs", &engine).unwrap();
        match rewritten {
            QueryNode::Ids { values, .. } => assert_eq!(values, vec!["p1#0".to_string()]),
            other => panic!("expected ids, got {other:?}"),
        }
    }

    #[test]
    fn rewrite_is_idempotent() {
        let engine = engine_with_parent_child();
        let node = QueryNode::HasChild {
            type_name: "comment".into(),
            query: Box::new(QueryNode::Term { field: "kind".into(), value: crate::value::Value::String("child".into()), boost: 1.0 }),
            boost: 1.0,
        };
        let once = rewrite(node, "docs", &engine).unwrap();
        let twice = rewrite(once.clone(), "docs", &engine).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn non_marker_nodes_are_preserved() {
        let engine = engine_with_parent_child();
        let node = QueryNode::Term { field: "kind".into(), value: crate::value::Value::String("parent".into()), boost: 1.0 };
        let rewritten = rewrite(node.clone(), "docs", &engine).unwrap();
        assert_eq!(node, rewritten);
    }
}
