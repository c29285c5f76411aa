use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use constant_time_eq::constant_time_eq;

use crate::utils::error::AppError;

/// Header carrying the shared secret on payment-provider callbacks.
pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

const API_HEADERS: [(&str, &str); 6] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("content-security-policy", "default-src 'none'; frame-ancestors 'none'"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
];

/// Adds the fixed API security headers, plus HSTS when serving behind TLS
/// in production.
pub fn apply_security_headers(mut response: Response, include_hsts: bool) -> Response {
    let headers = response.headers_mut();
    for (name, value) in API_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    if include_hsts {
        headers.insert(
            HeaderName::from_static("strict-transport-security"),
            HeaderValue::from_static(HSTS_VALUE),
        );
    }
    response
}

/// Response middleware for `axum::middleware::map_response_with_state`,
/// with the HSTS switch as state.
pub async fn security_headers(State(include_hsts): State<bool>, response: Response) -> Response {
    apply_security_headers(response, include_hsts)
}

/// Verifies the shared callback token the payment provider sends with every
/// webhook delivery.
#[derive(Clone)]
pub struct CallbackVerifier {
    token: String,
}

impl CallbackVerifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let presented = headers
            .get(CALLBACK_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::AuthError("Missing callback token".to_string()))?;

        if self.token.is_empty() || !constant_time_eq(presented.as_bytes(), self.token.as_bytes())
        {
            return Err(AppError::AuthError("Invalid callback token".to_string()));
        }
        Ok(())
    }
}
