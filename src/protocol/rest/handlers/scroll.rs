//! `GET`/`POST /_search/scroll` (continue a cursor) and
//! `DELETE /_search/scroll` (release one or more cursors), spec §6.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value as Json_;

use crate::response::shape_search_response;
use crate::search::{execute_search, SearchRequest};
use crate::Gateway;

use crate::protocol::rest::error::RestError;
use crate::protocol::rest::handlers::body_or_null;

#[derive(Debug, Deserialize, Default)]
pub struct ScrollQueryParams {
    pub scroll_id: Option<String>,
}

pub async fn continue_scroll(
    State(gateway): State<Arc<Gateway>>,
    Query(params): Query<ScrollQueryParams>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<Json_>), RestError> {
    let body = body_or_null(&body)?;
    let scroll_id = params
        .scroll_id
        .or_else(|| body.get("scroll_id").and_then(Json_::as_str).map(str::to_string))
        .ok_or_else(|| crate::error::Error::BadRequest("scroll_id is required".to_string()))?;

    let cursor = gateway.scrolls.get(&scroll_id)?;
    let use_search_after = cursor.use_search_after();

    let req = SearchRequest {
        query: cursor.query.clone(),
        from: if use_search_after { 0 } else { cursor.from },
        size: cursor.size,
        sort: cursor.sort.clone(),
        search_after: if use_search_after { cursor.last_sort.clone() } else { None },
        source_includes: cursor.source_includes.clone(),
        aggs: cursor.aggs.clone(),
        ..SearchRequest::default()
    };

    let outcome = execute_search(&cursor.index, gateway.engine(), &req)?;

    let last_sort = if cursor.sort.is_empty() { None } else { outcome.hits.last().map(|h| h.sort.clone()) };
    gateway.scrolls.update(&scroll_id, last_sort)?;

    let response_body = shape_search_response(&cursor.index, &outcome, Some(&scroll_id));
    Ok((StatusCode::OK, Json(response_body)))
}

pub async fn release_scroll(
    State(gateway): State<Arc<Gateway>>,
    Query(params): Query<ScrollQueryParams>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<Json_>), RestError> {
    let body = body_or_null(&body)?;
    let ids = collect_scroll_ids(&params, &body)?;

    let mut freed = 0u32;
    for id in &ids {
        if gateway.scrolls.delete(id).is_ok() {
            freed += 1;
        }
    }

    Ok((StatusCode::OK, Json(serde_json::json!({"succeeded": true, "num_freed": freed}))))
}

fn collect_scroll_ids(params: &ScrollQueryParams, body: &Json_) -> Result<Vec<String>, RestError> {
    if let Some(id) = &params.scroll_id {
        return Ok(vec![id.clone()]);
    }
    match body.get("scroll_id").unwrap_or(body) {
        Json_::String(id) => Ok(vec![id.clone()]),
        Json_::Array(items) => Ok(items.iter().filter_map(Json_::as_str).map(str::to_string).collect()),
        _ => Err(crate::error::Error::BadRequest("scroll_id is required".to_string()).into()),
    }
}
