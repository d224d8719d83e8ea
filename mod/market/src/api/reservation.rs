use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;

use agrimart_core::ServiceError;

use super::{created, ok, AppState};
use crate::service::reservation::CreateReservationInput;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reservations", post(create_reservation))
        .route("/reservations/user/{user_id}", get(list_user_reservations))
        .route("/reservations/status", patch(update_status))
}

async fn create_reservation(
    State(svc): State<AppState>,
    Json(input): Json<CreateReservationInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    created(svc.create_reservation(input))
}

async fn list_user_reservations(
    State(svc): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let items = svc.list_user_reservations(&user_id)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "count": items.len(),
        "data": items,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateStatusBody {
    id: Option<String>,
    status: Option<String>,
}

async fn update_status(
    State(svc): State<AppState>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    ok(svc.update_reservation_status(
        body.id.as_deref().unwrap_or_default(),
        body.status.as_deref().unwrap_or_default(),
    ))
}
