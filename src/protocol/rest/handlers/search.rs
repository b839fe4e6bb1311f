//! `GET`/`POST /{index}/_search` (spec §6), with an optional `?scroll=<ttl>`
//! to open a cursor in the same request.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value as Json_;

use crate::query::join_rewriter;
use crate::response::shape_search_response;
use crate::scroll::parse_ttl;
use crate::search::execute_search;
use crate::Gateway;

use crate::protocol::rest::dto::parse_search_request;
use crate::protocol::rest::error::RestError;
use crate::protocol::rest::handlers::body_or_null;

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
    pub scroll: Option<String>,
}

pub async fn search(
    State(gateway): State<Arc<Gateway>>,
    Path(index): Path<String>,
    Query(params): Query<SearchParams>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<Json_>), RestError> {
    let body = body_or_null(&body)?;
    let mut req = parse_search_request(&body, gateway.config.search.default_size)?;
    req.query = join_rewriter::rewrite(req.query, &index, gateway.engine())?;

    let outcome = execute_search(&index, gateway.engine(), &req)?;

    let scroll_id = if let Some(ttl) = &params.scroll {
        let ttl = parse_ttl(Some(ttl))?;
        let id = gateway.scrolls.create(&index, req.query.clone(), req.sort.clone(), req.size, req.source_includes.clone(), req.aggs.clone(), ttl);
        // Advance the cursor past this already-served page: search_after mode
        // when sorted (so the next continuation resumes after the last hit),
        // from-pagination otherwise.
        let last_sort = if req.sort.is_empty() { None } else { outcome.hits.last().map(|h| h.sort.clone()) };
        gateway.scrolls.update(&id, last_sort)?;
        Some(id)
    } else {
        None
    };

    let response_body = shape_search_response(&index, &outcome, scroll_id.as_deref());
    Ok((StatusCode::OK, Json(response_body)))
}
