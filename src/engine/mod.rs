//! Embedded index engine contract.
//!
//! The core is written against this trait, not against any particular
//! storage technology (spec §1: the engine itself is an external
//! collaborator). [`memory::MemoryEngine`] is the one concrete
//! implementation in this crate, sufficient to drive and test C1-C13.

pub mod codec;
pub mod memory;

use crate::error::Result;
use crate::query::ast::QueryNode;
use crate::value::{Document, Value};

/// A single sort key component: ascending unless `descending` is set.
#[derive(Debug, Clone)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        SortField { field: field.into(), descending: false }
    }
}

/// Parameters for a single engine search call.
#[derive(Debug, Clone)]
pub struct EngineSearchRequest {
    pub query: QueryNode,
    pub from: usize,
    pub size: usize,
    pub sort: Vec<SortField>,
    pub search_after: Option<Vec<Value>>,
    /// When set, only these fields are loaded per hit instead of the full
    /// document (the "Fields projection" of spec §4.5, used by the metric
    /// aggregation path to avoid materialising `_source`).
    pub fields_projection: Option<Vec<String>>,
}

impl Default for EngineSearchRequest {
    fn default() -> Self {
        EngineSearchRequest {
            query: QueryNode::MatchAll { boost: 1.0 },
            from: 0,
            size: 10,
            sort: Vec::new(),
            search_after: None,
            fields_projection: None,
        }
    }
}

/// A single matched document, id + score + sort vector (the engine returns
/// ids only; `_source` is fetched separately, per spec §4.4).
#[derive(Debug, Clone)]
pub struct EngineHit {
    pub id: String,
    pub score: f32,
    pub sort: Vec<Value>,
    /// Populated only when `fields_projection` was set on the request.
    pub fields: Option<Document>,
}

#[derive(Debug, Clone, Default)]
pub struct EngineSearchResult {
    pub hits: Vec<EngineHit>,
    pub total: u64,
}

/// One raw facet term as the engine stores it: a possibly prefix-coded byte
/// key plus its document count. Decoding these bytes into a typed [`Value`]
/// is C6's job (agg::facet_decode), not the engine's.
#[derive(Debug, Clone)]
pub struct RawFacetEntry {
    pub term_bytes: Vec<u8>,
    pub count: u64,
}

/// A half-open or closed numeric range used by range/date-range bucket
/// aggregations, `None` meaning unbounded on that side.
#[derive(Debug, Clone)]
pub struct RangeSpec {
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RangeCount {
    pub spec: RangeSpec,
    pub count: u64,
}

/// The embedded full-text index engine contract. Out of scope per spec §1
/// beyond this contract and the single in-memory implementation.
pub trait SearchEngine: Send + Sync {
    fn index_exists(&self, index: &str) -> bool;

    fn create_index(&self, index: &str);

    fn search(&self, index: &str, req: &EngineSearchRequest) -> Result<EngineSearchResult>;

    /// Fetch one document's fields/`_source`. Used for `_source` materialisation
    /// and as the reader-open fallback path of spec §4.4/§5.
    fn fetch_document(&self, index: &str, id: &str) -> Result<Option<Document>>;

    /// Facet term counts for a field, restricted by `query`, raw byte keys
    /// exactly as the engine would emit them (possibly prefix-coded).
    fn facet_terms(
        &self,
        index: &str,
        field: &str,
        query: &QueryNode,
        size: usize,
    ) -> Result<Vec<RawFacetEntry>>;

    /// Range/date-range facet: engine-native since ranges are computed over
    /// the already-decoded numeric field, not over raw term bytes.
    fn facet_ranges(
        &self,
        index: &str,
        field: &str,
        query: &QueryNode,
        ranges: &[RangeSpec],
    ) -> Result<Vec<RangeCount>>;

    /// Exact match count for `size = 0` searches / `_count`.
    fn count(&self, index: &str, query: &QueryNode) -> Result<u64>;

    fn index_document(&self, index: &str, id: &str, doc: Document) -> Result<()>;

    /// Returns true if a document existed and was removed.
    fn delete_document(&self, index: &str, id: &str) -> Result<bool>;
}
