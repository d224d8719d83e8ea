pub mod equipment;
pub mod listing;
pub mod reservation;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart},
    http::StatusCode,
    Json, Router,
};
use serde::Serialize;

use agrimart_core::{ListResult, ServiceError};

use crate::service::attachment::Upload;
use crate::service::MarketService;

/// Shared application state.
pub type AppState = Arc<MarketService>;

/// Upload size cap for attachment images.
pub(crate) const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Build the marketplace API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/market/v1", api_routes())
        // Leave headroom above the image cap for the other form fields.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(listing::routes())
        .merge(equipment::routes())
        .merge(reservation::routes())
}

// ── Response envelope ───────────────────────────────────────────────
//
// Success: {"success": true, "data": ...} plus pagination on lists.
// Errors are rendered by ServiceError's IntoResponse.

pub(crate) fn ok<T: Serialize>(
    result: Result<T, ServiceError>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let data = result?;
    Ok(Json(serde_json::json!({"success": true, "data": data})))
}

pub(crate) fn created<T: Serialize>(
    result: Result<T, ServiceError>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    let data = result?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"success": true, "data": data})),
    ))
}

pub(crate) fn page(
    result: Result<ListResult<serde_json::Value>, ServiceError>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = result?;
    Ok(Json(serde_json::json!({
        "success": true,
        "count": result.items.len(),
        "data": result.items,
        "pagination": {
            "page": result.page,
            "limit": result.limit,
            "total": result.total,
            "pages": result.pages,
        },
    })))
}

// ── Multipart intake ────────────────────────────────────────────────

/// Read a multipart form into text fields plus an optional `image` part.
///
/// Only `image/*` content is accepted for the file part, capped at
/// [`MAX_UPLOAD_BYTES`]. Nothing is written to storage here — staging
/// happens in the service once validation passed.
pub(crate) async fn read_form(
    mut multipart: Multipart,
) -> Result<(BTreeMap<String, String>, Option<Upload>), ServiceError> {
    let mut fields = BTreeMap::new();
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Validation(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let content_type = field.content_type().unwrap_or_default().to_string();
            if !content_type.starts_with("image/") {
                return Err(ServiceError::Validation(
                    "only image uploads are allowed".into(),
                ));
            }
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let data = field.bytes().await.map_err(|e| {
                ServiceError::Validation(format!("failed to read upload: {}", e))
            })?;
            if data.len() > MAX_UPLOAD_BYTES {
                return Err(ServiceError::Validation(
                    "image exceeds the 5 MiB limit".into(),
                ));
            }
            upload = Some(Upload {
                file_name,
                data: data.to_vec(),
            });
        } else {
            let text = field.text().await.map_err(|e| {
                ServiceError::Validation(format!("failed to read field '{}': {}", name, e))
            })?;
            fields.insert(name, text);
        }
    }

    Ok((fields, upload))
}
