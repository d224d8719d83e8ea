use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use agrimart_core::{ListQuery, ServiceError};

use super::{created, ok, page, read_form, AppState};
use crate::service::equipment::EQUIPMENT_QUERY_SCHEMA;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/equipment", get(list_equipment).post(create_equipment))
        .route(
            "/equipment/{id}",
            get(get_equipment)
                .put(update_equipment)
                .delete(delete_equipment),
        )
}

async fn list_equipment(
    State(svc): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let query = ListQuery::parse(&pairs, &EQUIPMENT_QUERY_SCHEMA)?;
    page(svc.list_equipment(&query))
}

async fn get_equipment(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    ok(svc.get_equipment(&id))
}

async fn create_equipment(
    State(svc): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    let (fields, upload) = read_form(multipart).await?;
    created(svc.create_equipment(&fields, upload))
}

async fn update_equipment(
    State(svc): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let (fields, upload) = read_form(multipart).await?;
    ok(svc.update_equipment(&id, &fields, upload))
}

async fn delete_equipment(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.delete_equipment(&id)?;
    Ok(Json(serde_json::json!({"success": true, "data": {}})))
}
