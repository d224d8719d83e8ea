use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use agrimart_core::{ListQuery, ServiceError};

use super::{created, ok, page, read_form, AppState};
use crate::service::listing::LISTING_QUERY_SCHEMA;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/listings", get(list_listings).post(create_listing))
        .route("/listings/category/{category}", get(listings_by_category))
        .route(
            "/listings/{id}",
            get(get_listing).put(update_listing).delete(delete_listing),
        )
}

async fn list_listings(
    State(svc): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let query = ListQuery::parse(&pairs, &LISTING_QUERY_SCHEMA)?;
    page(svc.list_listings(&query))
}

async fn listings_by_category(
    State(svc): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let items = svc.list_listings_by_category(&category)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "count": items.len(),
        "data": items,
    })))
}

async fn get_listing(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    ok(svc.get_listing(&id))
}

async fn create_listing(
    State(svc): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    let (fields, upload) = read_form(multipart).await?;
    created(svc.create_listing(&fields, upload))
}

async fn update_listing(
    State(svc): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let (fields, upload) = read_form(multipart).await?;
    ok(svc.update_listing(&id, &fields, upload))
}

async fn delete_listing(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.delete_listing(&id)?;
    Ok(Json(serde_json::json!({"success": true, "data": {}})))
}
