//! # searchgate
//!
//! A translation and execution gateway that accepts a search/aggregation
//! request in a Lucene/Elasticsearch-shaped query DSL and runs it against a
//! pluggable [`SearchEngine`](engine::SearchEngine) backend.
//!
//! ## Pipeline
//!
//! ```text
//! Request body (JSON)
//!     |
//! [query::parse_query]        -> QueryNode AST
//!     |
//! [query::join_rewriter]      -> rewritten QueryNode (has_child/has_parent/percolate)
//!     |
//! [agg::parse_aggs]           -> AggNode plan (+ facet_decode for terms/range)
//!     |
//! [search::execute_search]    -> SearchOutcome (hits, total, aggs)
//!     |
//! [script::execute]           -> script_fields evaluated per hit
//!     |
//! [response::shape_search_response] -> response JSON
//! ```
//!
//! | module | role |
//! |---|---|
//! | `error` | Central `Error`/`ErrorKind`, HTTP status mapping |
//! | `value` | Tagged-union `Value` + `Document` |
//! | `config` | Layered TOML/env configuration |
//! | `catalog` | Index mapping directory (copy_to, nested paths) |
//! | `engine` | `SearchEngine` trait + in-memory reference backend |
//! | `query` | Query DSL AST, parser, join rewriter |
//! | `agg` | Aggregation plan, parser, facet decoding, executor |
//! | `search` | Search executor tying query + agg together |
//! | `response` | Response/error shaping |
//! | `script` | Script field runtime bridge |
//! | `scroll` | Scroll cursor manager |
//! | `version` | Per-document version/seq_no bookkeeping |
//! | `task` | Cooperative cancellable async tasks (delete_by_query) |
//! | `write` | Copy-to/nested-doc preprocessors, bulk executor |
//! | `protocol` | HTTP surface (axum) |

pub mod error;
pub mod value;
pub mod config;
pub mod catalog;
pub mod engine;
pub mod query;
pub mod agg;
pub mod search;
pub mod response;
pub mod script;
pub mod scroll;
pub mod version;
pub mod task;
pub mod write;
pub mod protocol;

pub use catalog::{Catalog, IndexMapping};
pub use config::Config;
pub use engine::SearchEngine;
pub use engine::memory::MemoryEngine;
pub use error::{Error, ErrorKind, Result};
pub use scroll::ScrollManager;
pub use task::TaskManager;
pub use version::VersionManager;

/// Ties the engine, catalog and the stateful managers (scroll/version/task)
/// together behind one handle so the protocol layer only needs to hold one
/// `Arc<Gateway>`.
pub struct Gateway {
    pub config: Config,
    pub catalog: Catalog,
    pub scrolls: ScrollManager,
    pub versions: VersionManager,
    pub tasks: TaskManager,
    engine: Box<dyn SearchEngine>,
}

impl Gateway {
    /// Builds a gateway around the in-memory reference engine.
    pub fn new(config: Config) -> Self {
        Gateway {
            config,
            catalog: Catalog::new(),
            scrolls: ScrollManager::new(),
            versions: VersionManager::new(),
            tasks: TaskManager::new(),
            engine: Box::new(MemoryEngine::new()),
        }
    }

    /// Builds a gateway around a caller-supplied engine, for testing against
    /// fakes or future non-memory backends.
    pub fn with_engine(config: Config, engine: Box<dyn SearchEngine>) -> Self {
        Gateway {
            config,
            catalog: Catalog::new(),
            scrolls: ScrollManager::new(),
            versions: VersionManager::new(),
            tasks: TaskManager::new(),
            engine,
        }
    }

    pub fn engine(&self) -> &dyn SearchEngine {
        self.engine.as_ref()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Gateway::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_creates_indexes_on_the_memory_engine() {
        let gateway = Gateway::default();
        assert!(!gateway.engine().index_exists("products"));
        gateway.engine().create_index("products");
        assert!(gateway.engine().index_exists("products"));
    }
}
