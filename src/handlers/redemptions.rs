use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::handlers::AppState;
use crate::utils::auth::AuthUser;
use crate::utils::error::AppError;
use crate::utils::response::created;

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub invoice_code: String,
    pub platform: String,
}

pub async fn redeem_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RedeemRequest>,
) -> Result<Response, AppError> {
    let receipt = state
        .redemptions
        .redeem(user.user_id, &request.invoice_code, &request.platform)
        .await?;

    Ok(created(receipt, "Invoice redeemed"))
}
