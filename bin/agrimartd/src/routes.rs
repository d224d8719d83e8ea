//! Route registration — collects module routes + system endpoints.

use std::path::Path;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{http::StatusCode, Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the complete router with all routes.
///
/// Module routers carry their own prefixes (e.g. `/market/v1`), so they
/// are merged rather than nested. Stored attachments are served
/// statically under `/uploads/{blob key}`.
pub fn build_router(module_routes: Vec<(String, Router)>, uploads_dir: &Path) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .nest_service("/uploads", ServeDir::new(uploads_dir));

    for (name, router) in module_routes {
        tracing::info!(module = %name, "mounting module routes");
        app = app.merge(router);
    }

    // Anything unrouted gets a JSON 404 instead of a bare error.
    app.fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "agrimartd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "error": {
                "code": "NOT_FOUND",
                "message": "route not found",
            }
        })),
    )
}
