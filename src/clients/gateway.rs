use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::ResourceKind;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable: {0}")]
    Transport(String),

    #[error("payment gateway rejected invoice ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected payment gateway response: {0}")]
    Malformed(String),
}

/// One-time invoice to open for a booking attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRequest {
    pub user_id: Uuid,
    pub source_type: ResourceKind,
    pub source_code: String,
    /// Locally generated code, sent as the provider's external id and echoed
    /// back on every callback.
    pub transaction_code: String,
    pub amount: Decimal,
    pub description: String,
    pub payer_email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayInvoice {
    pub invoice_id: String,
    pub transaction_code: String,
    pub invoice_url: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<GatewayInvoice, GatewayError>;
}

#[derive(Serialize)]
struct CreateInvoiceBody<'a> {
    external_id: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    description: &'a str,
    payer_email: &'a str,
    invoice_duration: u64,
}

#[derive(Deserialize)]
struct CreateInvoiceReply {
    id: String,
    external_id: String,
    invoice_url: String,
    expiry_date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GatewayErrorReply {
    message: Option<String>,
}

/// Xendit-style invoice API client.
#[derive(Clone)]
pub struct XenditGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    invoice_duration: Duration,
}

impl XenditGateway {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        invoice_duration: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            invoice_duration,
        }
    }
}

#[async_trait]
impl PaymentGateway for XenditGateway {
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<GatewayInvoice, GatewayError> {
        let body = CreateInvoiceBody {
            external_id: &request.transaction_code,
            amount: request.amount,
            description: &request.description,
            payer_email: &request.payer_email,
            invoice_duration: self.invoice_duration.as_secs(),
        };

        let response = self
            .http
            .post(format!("{}/v2/invoices", self.base_url))
            .basic_auth(&self.secret_key, Some(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<GatewayErrorReply>()
                .await
                .ok()
                .and_then(|reply| reply.message)
                .unwrap_or_else(|| status.to_string());
            warn!(
                status = status.as_u16(),
                transaction_code = %request.transaction_code,
                "Invoice creation rejected"
            );
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let reply: CreateInvoiceReply = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if reply.external_id != request.transaction_code {
            return Err(GatewayError::Malformed(format!(
                "external id '{}' does not match '{}'",
                reply.external_id, request.transaction_code
            )));
        }

        debug!(
            invoice_id = %reply.id,
            transaction_code = %reply.external_id,
            user_id = %request.user_id,
            "Invoice created"
        );

        Ok(GatewayInvoice {
            invoice_id: reply.id,
            transaction_code: reply.external_id,
            invoice_url: reply.invoice_url,
            expires_at: reply.expiry_date,
        })
    }
}
