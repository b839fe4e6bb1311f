//! Single-document write endpoints (spec §6): `/{index}/_doc/{id}`,
//! `/{index}/_create/{id}`, `/{index}/_update/{id}`. Routed through the same
//! copy-to/nested-doc preprocessing and version bookkeeping as bulk items
//! (C11/C8) by building a one-item bulk request and reusing [`execute_bulk`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value as Json_;

use crate::write::execute_bulk;
use crate::Gateway;

use crate::protocol::rest::error::RestError;

async fn write_one(gateway: Arc<Gateway>, action: &str, index: String, id: String, body: Json_) -> Result<(StatusCode, Json<Json_>), RestError> {
    let header = serde_json::json!({action: {"_index": index, "_id": id}});
    let ndjson = format!("{}\n{}\n", header, body);
    let mut results = execute_bulk(gateway.engine(), &gateway.catalog, &gateway.versions, &ndjson)?;
    let result = results.pop().ok_or_else(|| crate::error::Error::Internal("bulk executor returned no result".to_string()))?;
    let item = result.get(action).cloned().unwrap_or(Json_::Null);
    let status = item.get("status").and_then(Json_::as_u64).unwrap_or(200) as u16;
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    Ok((code, Json(item)))
}

pub async fn index_doc(State(gateway): State<Arc<Gateway>>, Path((index, id)): Path<(String, String)>, Json(body): Json<Json_>) -> Result<(StatusCode, Json<Json_>), RestError> {
    write_one(gateway, "index", index, id, body).await
}

pub async fn create_doc(State(gateway): State<Arc<Gateway>>, Path((index, id)): Path<(String, String)>, Json(body): Json<Json_>) -> Result<(StatusCode, Json<Json_>), RestError> {
    write_one(gateway, "create", index, id, body).await
}

pub async fn update_doc(State(gateway): State<Arc<Gateway>>, Path((index, id)): Path<(String, String)>, Json(body): Json<Json_>) -> Result<(StatusCode, Json<Json_>), RestError> {
    write_one(gateway, "update", index, id, body).await
}
