//! `POST /{index}/_delete_by_query` and `/_tasks/{task_id}`[`/_cancel`]
//! (spec §6/C9): delete-by-query runs as a cancellable background task,
//! polling its token between batches (spec §4.9/§5).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value as Json_;

use crate::query::{join_rewriter, parse_query, QueryNode};
use crate::task::TaskProgress;
use crate::Gateway;

use crate::protocol::rest::error::RestError;
use crate::protocol::rest::handlers::body_or_null;

pub async fn delete_by_query(
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

    if !gateway.engine().index_exists(&index) {
        return Err(crate::error::Error::IndexNotFound(index).into());
    }

    let total = gateway.engine().count(&index, &query)?;
    let (task_id, token) = gateway.tasks.start();

    let batch_size = gateway.config.search.composite_batch_size;
    let run_gateway = Arc::clone(&gateway);
    let run_index = index.clone();
    let run_query = query.clone();
    let run_task_id = task_id.clone();
    tokio::spawn(async move {
        run_delete_by_query(run_gateway, run_index, run_query, run_task_id, token, total, batch_size);
    });

    Ok((StatusCode::OK, Json(serde_json::json!({"task_id": task_id, "total": total}))))
}

fn run_delete_by_query(gateway: Arc<Gateway>, index: String, query: QueryNode, task_id: String, token: crate::task::CancellationToken, total: u64, batch_size: usize) {
    use crate::engine::EngineSearchRequest;

    let mut deleted = 0u64;
    let mut batches = 0u64;
    loop {
        if token.is_cancelled() {
            let _ = gateway.tasks.mark_cancelled(&task_id);
            return;
        }
        let req = EngineSearchRequest { query: query.clone(), from: 0, size: batch_size, sort: Vec::new(), search_after: None, fields_projection: None };
        let page = match gateway.engine().search(&index, &req) {
            Ok(page) => page,
            Err(err) => {
                let _ = gateway.tasks.fail(&task_id, err.to_string());
                return;
            }
        };
        if page.hits.is_empty() {
            break;
        }
        for hit in &page.hits {
            if gateway.engine().delete_document(&index, &hit.id).unwrap_or(false) {
                let _ = gateway.versions.delete(&index, &hit.id);
                deleted += 1;
            }
        }
        batches += 1;
        let _ = gateway.tasks.report_progress(&task_id, TaskProgress { total, deleted, batches });
    }
    let _ = gateway.tasks.complete(&task_id);
}

pub async fn task_status(State(gateway): State<Arc<Gateway>>, Path(task_id): Path<String>) -> Result<(StatusCode, Json<Json_>), RestError> {
    let snapshot = gateway.tasks.snapshot(&task_id)?;
    let body = serde_json::json!({
        "task_id": snapshot.id,
        "status": format!("{:?}", snapshot.status).to_lowercase(),
        "running_time_ms": snapshot.running_time_ms,
        "progress": {"total": snapshot.progress.total, "deleted": snapshot.progress.deleted, "batches": snapshot.progress.batches},
        "failure_reason": snapshot.failure_reason,
    });
    Ok((StatusCode::OK, Json(body)))
}

pub async fn cancel_task(State(gateway): State<Arc<Gateway>>, Path(task_id): Path<String>) -> Result<(StatusCode, Json<Json_>), RestError> {
    gateway.tasks.request_cancel(&task_id)?;
    Ok((StatusCode::OK, Json(serde_json::json!({"task_id": task_id, "cancelled": true}))))
}
