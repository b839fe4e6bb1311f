//! Axum handlers for the spec §6 HTTP surface. Kept intentionally thin:
//! each handler only translates an HTTP request/response to/from the core
//! pipeline's types.

pub mod bulk;
pub mod count;
pub mod docs;
pub mod scroll;
pub mod search;
pub mod tasks;

use serde_json::Value as Json;

use crate::error::{Error, Result};

/// Parses a request body, treating an empty body as `Json::Null` rather
/// than a parse error (`GET /{index}/_search` commonly has no body).
pub(super) fn body_or_null(bytes: &[u8]) -> Result<Json> {
    if bytes.is_empty() {
        return Ok(Json::Null);
    }
    serde_json::from_slice(bytes).map_err(Error::from)
}
