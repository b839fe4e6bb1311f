//! Aggregation planning, decoding and execution (C3, C5, C6).

pub mod executor;
pub mod facet_decode;
pub mod parser;
pub mod plan;

pub use executor::AggExecutor;
pub use parser::{parse_aggs, serialize_plan};
pub use plan::{AggKind, AggNode, ParseWarning};
