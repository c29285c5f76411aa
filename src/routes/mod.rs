use axum::routing::{delete, get, patch, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, security_headers};
use crate::handlers::{admin, bookings, callbacks, health_check, profile, redemptions, AppState};

pub fn create_routes(state: AppState, cors_allowed_origins: &str, include_hsts: bool) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/rooms/:code/bookings", post(bookings::book_room))
        .route("/tournaments/:code/bookings", post(bookings::book_tournament))
        .route("/payments/callback", post(callbacks::payment_callback))
        .route("/redemptions", post(redemptions::redeem_invoice))
        .route("/me/profile", get(profile::my_profile))
        .route("/admin/:kind/:code/winners", post(admin::set_winner))
        .route("/admin/:kind/:code/status", patch(admin::update_status))
        .route("/admin/:kind/:code", delete(admin::delete_resource))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::map_response_with_state(
            include_hsts,
            security_headers,
        ))
        .layer(create_cors_layer(cors_allowed_origins))
}
