//! Search execution (C4).

pub mod executor;

pub use executor::{execute_search, HitResult, SearchOutcome, SearchRequest};
