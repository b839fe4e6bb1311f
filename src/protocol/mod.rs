//! HTTP surface over the core pipeline (spec §6).
//!
//! Thin by design: handlers translate HTTP bodies to/from the C1-C13 core
//! types and otherwise defer to `query`, `agg`, `search`, `response`, `write`,
//! `scroll`, `version` and `task`.

pub mod rest;

pub use rest::create_router;
