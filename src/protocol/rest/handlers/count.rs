//! `GET`/`POST /{index}/_count` (spec §6): exact match count, size=0 on the engine.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value as Json_;

use crate::query::{join_rewriter, parse_query, QueryNode};
use crate::Gateway;

use crate::protocol::rest::error::RestError;
use crate::protocol::rest::handlers::body_or_null;

pub async fn count(
    State(gateway): State<Arc<Gateway>>,
    Path(index): Path<String>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<Json_>), RestError> {
    let body = body_or_null(&body)?;
    let query = match body.get("query") {
        Some(q) => parse_query(q)?,
        None => QueryNode::match_all(),
    };
    let query = join_rewriter::rewrite(query, &index, gateway.engine())?;

    let count = gateway.engine().count(&index, &query)?;
    Ok((StatusCode::OK, Json(serde_json::json!({"count": count, "_shards": {"total": 1, "successful": 1, "skipped": 0, "failed": 0}}))))
}
