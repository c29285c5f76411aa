use axum::extract::{Path, State};
use axum::response::Response;

use crate::handlers::AppState;
use crate::models::ResourceKind;
use crate::utils::auth::AuthUser;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn book_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    open(state, ResourceKind::Room, &code, user).await
}

pub async fn book_tournament(
    State(state): State<AppState>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    open(state, ResourceKind::Tournament, &code, user).await
}

async fn open(
    state: AppState,
    kind: ResourceKind,
    code: &str,
    user: AuthUser,
) -> Result<Response, AppError> {
    let receipt = state
        .bookings
        .open_booking_invoice(kind, code, user.user_id)
        .await?;

    if receipt.reused {
        Ok(success(receipt, "Pending invoice returned"))
    } else {
        Ok(created(receipt, "Invoice created"))
    }
}
