//! HTTP API module: Axum router over the search/aggregation core.
//!
//! Grounded on the teacher's `create_router`/`start_http_server` shape (CORS
//! layer, request body size limit, graceful shutdown on SIGINT/SIGTERM), with
//! the teacher's auth/rate-limit/WebSocket middleware dropped: this surface
//! has no session concept to authenticate against (spec Non-goals: no
//! clustering/sharding, no security layer).

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

use crate::Gateway;

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

async fn health() -> &'static str {
    "ok"
}

/// Builds the Axum router over a shared [`Gateway`].
pub fn create_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/:index/_search", get(handlers::search::search).post(handlers::search::search))
        .route("/_search/scroll", get(handlers::scroll::continue_scroll).post(handlers::scroll::continue_scroll).delete(handlers::scroll::release_scroll))
        .route("/:index/_count", get(handlers::count::count).post(handlers::count::count))
        .route("/:index/_delete_by_query", post(handlers::tasks::delete_by_query))
        .route("/_tasks/:task_id", get(handlers::tasks::task_status))
        .route("/_tasks/:task_id/_cancel", post(handlers::tasks::cancel_task))
        .route("/:index/_doc/:id", post(handlers::docs::index_doc).put(handlers::docs::index_doc))
        .route("/:index/_create/:id", post(handlers::docs::create_doc).put(handlers::docs::create_doc))
        .route("/:index/_update/:id", post(handlers::docs::update_doc).put(handlers::docs::update_doc))
        .route("/_bulk", post(handlers::bulk::bulk))
        .route("/:index/_bulk", post(handlers::bulk::bulk_scoped))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(gateway)
}

/// Starts the HTTP server with graceful shutdown on SIGINT/SIGTERM, mirroring
/// the teacher's `start_http_server`, minus the session reaper/auto-compact
/// background tasks this engine has no equivalent of. The scroll reaper is
/// spawned here instead (spec §4.7: "every 1 minute").
pub async fn start_http_server(gateway: Arc<Gateway>, host: &str, port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(Arc::clone(&gateway));

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let reaper_gateway = Arc::clone(&gateway);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reaped = reaper_gateway.scrolls.reap_expired();
                    if reaped > 0 {
                        info!(reaped, "scroll_reaper_cleanup");
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("scroll_reaper_shutdown");
                    break;
                }
            }
        }
    });

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!(%addr, "searchgate listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(%err, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => { info!("received SIGINT, shutting down"); }
            _ = sigterm.recv() => { info!("received SIGTERM, shutting down"); }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received SIGINT, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn fixture_gateway() -> Arc<Gateway> {
        let gateway = Arc::new(Gateway::default());
        gateway.engine().create_index("products");
        gateway
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = create_router(fixture_gateway());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn search_on_unknown_index_is_not_found() {
        let app = create_router(fixture_gateway());
        let req = Request::builder()
            .method("POST")
            .uri("/missing/_search")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_zero_hits() {
        let app = create_router(fixture_gateway());
        let req = Request::builder()
            .method("GET")
            .uri("/products/_search")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }
}
