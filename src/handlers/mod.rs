use std::sync::Arc;

use axum::response::Response;
use serde::Serialize;

use crate::config::CallbackVerifier;
use crate::models::ResourceKind;
use crate::services::{
    AdminService, BookingService, PaymentReconciler, ProfileService, RedemptionService,
};
use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod admin;
pub mod bookings;
pub mod callbacks;
pub mod profile;
pub mod redemptions;

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub redemptions: Arc<RedemptionService>,
    pub profiles: Arc<ProfileService>,
    pub admin: Arc<AdminService>,
    pub callback_verifier: CallbackVerifier,
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "arena-loyalty",
    };

    success(payload, "Health check successful")
}

/// Maps the `rooms` / `tournaments` path segment to a resource kind.
pub(crate) fn kind_from_path(segment: &str) -> Result<ResourceKind, AppError> {
    ResourceKind::from_path_segment(segment)
        .ok_or_else(|| AppError::NotFound(format!("Unknown resource type '{}'", segment)))
}
