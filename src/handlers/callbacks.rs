use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::handlers::AppState;
use crate::services::{CallbackOutcome, PaymentCallback};
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
struct CallbackFields {
    external_id: String,
    #[serde(alias = "paid_amount")]
    amount: Decimal,
    #[serde(default)]
    payment_method: Option<String>,
    status: String,
}

/// Fields the reconciler needs, with the body kept verbatim for audit.
fn parse_callback(body: String) -> Result<PaymentCallback, AppError> {
    let fields: CallbackFields = serde_json::from_str(&body)
        .map_err(|e| AppError::ValidationError(format!("Invalid callback body: {}", e)))?;

    Ok(PaymentCallback {
        external_id: fields.external_id,
        amount: fields.amount,
        payment_method: fields.payment_method.unwrap_or_default(),
        status: fields.status,
        raw_payload: body,
    })
}

pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    state.callback_verifier.verify(&headers)?;

    let callback = parse_callback(body)?;
    let outcome = state.reconciler.apply_payment_callback(callback).await?;

    let message = match &outcome {
        CallbackOutcome::Applied { .. } => "Callback applied",
        CallbackOutcome::AlreadyProcessed { .. } => "Callback already processed",
    };
    Ok(success(outcome, message))
}
