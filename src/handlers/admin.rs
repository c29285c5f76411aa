use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::{kind_from_path, AppState};
use crate::utils::auth::AdminUser;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

#[derive(Debug, Deserialize)]
pub struct SetWinnerRequest {
    pub user_id: Uuid,
    pub position: i32,
    #[serde(default)]
    pub reward_point: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn set_winner(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path((kind, code)): Path<(String, String)>,
    Json(request): Json<SetWinnerRequest>,
) -> Result<Response, AppError> {
    let kind = kind_from_path(&kind)?;
    tracing::debug!(admin_id = %admin.user_id, resource_code = %code, "Setting winner");

    let participant = state
        .admin
        .set_winner(
            kind,
            &code,
            request.user_id,
            request.position,
            request.reward_point,
        )
        .await?;

    Ok(success(participant, "Winner recorded"))
}

pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path((kind, code)): Path<(String, String)>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Response, AppError> {
    let kind = kind_from_path(&kind)?;
    let resource = state
        .admin
        .update_resource_status(kind, &code, &request.status)
        .await?;

    Ok(success(resource, "Status updated"))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path((kind, code)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let kind = kind_from_path(&kind)?;
    state.admin.delete_resource(kind, &code).await?;
    Ok(empty_success("Deleted"))
}
