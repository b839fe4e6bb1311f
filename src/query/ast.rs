//! Query node algebra (C1 data model, spec §3).
//!
//! The source represents queries as dynamically typed maps; here they are a
//! closed sum type built directly by the parser, so `has_child`/`has_parent`/
//! `percolate` markers carry their payload inline instead of needing a
//! pointer-identity side table (spec §9).

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum RangeEndpoint {
    Numeric(f64),
    Date(chrono::DateTime<chrono::Utc>),
    String(String),
}

/// `gt`/`gte`/`lt`/`lte`, each independently open or absent. Exactly
/// preserving which endpoints were given (spec: "endpoint openness is
/// preserved exactly") matters for the engine's range evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Range {
    pub gt: Option<RangeEndpoint>,
    pub gte: Option<RangeEndpoint>,
    pub lt: Option<RangeEndpoint>,
    pub lte: Option<RangeEndpoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Term { field: String, value: Value, boost: f32 },
    /// Present in the data model (spec §3); the parser never emits this
    /// variant directly — `terms` is desugared into [`QueryNode::Disjunction`]
    /// of per-value [`QueryNode::Term`] nodes at parse time (spec §4.1).
    Terms { field: String, values: Vec<Value>, boost: f32 },
    Match { field: String, query: String, boost: f32 },
    MatchPhrase { field: String, query: String, boost: f32 },
    MatchAll { boost: f32 },
    Prefix { field: String, value: String, boost: f32 },
    Wildcard { field: String, pattern: String, boost: f32 },
    Regexp { field: String, pattern: String, boost: f32 },
    Fuzzy { field: String, value: String, fuzziness: u32, boost: f32 },
    Range { field: String, range: Range, boost: f32 },
    Exists { field: String },
    Ids { values: Vec<String>, boost: f32 },
    Bool {
        must: Vec<QueryNode>,
        should: Vec<QueryNode>,
        must_not: Vec<QueryNode>,
        filter: Vec<QueryNode>,
        boost: f32,
    },
    Conjunction(Vec<QueryNode>),
    Disjunction(Vec<QueryNode>),
    Nested { path: String, query: Box<QueryNode>, boost: f32 },
    HasChild { type_name: String, query: Box<QueryNode>, boost: f32 },
    HasParent { type_name: String, query: Box<QueryNode>, boost: f32 },
    Percolate { field: String, index: String, id: String, boost: f32 },
}

impl QueryNode {
    pub fn match_all() -> QueryNode {
        QueryNode::MatchAll { boost: 1.0 }
    }

    pub fn boost(&self) -> f32 {
        match self {
            QueryNode::Term { boost, .. }
            | QueryNode::Terms { boost, .. }
            | QueryNode::Match { boost, .. }
            | QueryNode::MatchPhrase { boost, .. }
            | QueryNode::MatchAll { boost }
            | QueryNode::Prefix { boost, .. }
            | QueryNode::Wildcard { boost, .. }
            | QueryNode::Regexp { boost, .. }
            | QueryNode::Fuzzy { boost, .. }
            | QueryNode::Range { boost, .. }
            | QueryNode::Ids { boost, .. }
            | QueryNode::Bool { boost, .. }
            | QueryNode::Nested { boost, .. }
            | QueryNode::HasChild { boost, .. }
            | QueryNode::HasParent { boost, .. }
            | QueryNode::Percolate { boost, .. } => *boost,
            QueryNode::Exists { .. } | QueryNode::Conjunction(_) | QueryNode::Disjunction(_) => 1.0,
        }
    }

    /// Conjoin two queries (used by filter-bucket / nested-field-bucket
    /// aggregation execution to scope a base query, spec §4.5).
    pub fn and(self, other: QueryNode) -> QueryNode {
        match (self, other) {
            (QueryNode::MatchAll { .. }, other) => other,
            (this, QueryNode::MatchAll { .. }) => this,
            (QueryNode::Conjunction(mut a), QueryNode::Conjunction(b)) => {
                a.extend(b);
                QueryNode::Conjunction(a)
            }
            (QueryNode::Conjunction(mut a), other) => {
                a.push(other);
                QueryNode::Conjunction(a)
            }
            (this, other) => QueryNode::Conjunction(vec![this, other]),
        }
    }
}
