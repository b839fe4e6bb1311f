//! Aggregation plan data model (C3, spec §3).

use std::collections::BTreeMap;

use crate::query::ast::QueryNode;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapPolicy {
    Skip,
    InsertZeros,
}

/// A half-open numeric/date range entry as the user specified it (the
/// endpoints are resolved to `f64` by the parser; date strings are
/// converted via the same RFC3339/bare-date logic C1 uses).
#[derive(Debug, Clone)]
pub struct UserRange {
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompositeSource {
    pub name: String,
    pub field: String,
    /// When set, documents missing this source's field get a `null` key
    /// entry instead of being dropped from every bucket (ES `missing_bucket`).
    pub missing_bucket: bool,
}

#[derive(Debug, Clone)]
pub struct TopHitsSpec {
    pub size: usize,
    pub sort: Vec<crate::engine::SortField>,
    pub source_includes: Vec<String>,
}

impl Default for TopHitsSpec {
    fn default() -> Self {
        TopHitsSpec { size: 3, sort: Vec::new(), source_includes: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub enum AggKind {
    Terms { field: String, size: usize },
    NumericRange { field: String, ranges: Vec<UserRange> },
    DateRange { field: String, ranges: Vec<UserRange> },
    Avg { field: String },
    Sum { field: String },
    Min { field: String },
    Max { field: String },
    Stats { field: String },
    Cardinality { field: String, precision_threshold: f64 },
    Composite { sources: Vec<CompositeSource>, size: usize, after_key: Option<BTreeMap<String, Value>> },
    FilterBucket { query: QueryNode },
    NestedFieldBucket { path: String },
    TopHits(TopHitsSpec),
    BucketScript { buckets_path: BTreeMap<String, String>, script: String, gap_policy: GapPolicy, format: Option<String> },
    ScriptedMetric { init_script: String, map_script: String, combine_script: String, reduce_script: String, params: serde_json::Value },
}

/// One named aggregation tree node; the name is the user-supplied key from
/// the enclosing `aggs`/`aggregations` object.
#[derive(Debug, Clone)]
pub struct AggNode {
    pub name: String,
    pub kind: AggKind,
    pub sub_aggs: Vec<AggNode>,
}

impl AggKind {
    pub fn is_bucket(&self) -> bool {
        matches!(
            self,
            AggKind::Terms { .. }
                | AggKind::NumericRange { .. }
                | AggKind::DateRange { .. }
                | AggKind::Composite { .. }
                | AggKind::FilterBucket { .. }
                | AggKind::NestedFieldBucket { .. }
        )
    }
}

/// A non-fatal parse diagnostic: an unrecognised aggregation type under a
/// given name is skipped rather than failing the whole request (spec §4.3,
/// §9 "exception-for-control-flow" note).
#[derive(Debug, Clone)]
pub struct ParseWarning {
    pub name: String,
    pub reason: String,
}
