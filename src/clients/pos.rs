use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PosError {
    #[error("invoice '{0}' not found in POS")]
    NotFound(String),

    #[error("POS unreachable: {0}")]
    Transport(String),

    #[error("POS error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("unexpected POS response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDetail {
    pub order_no: String,
    pub total_amount: Decimal,
    pub line_items: Vec<LineItem>,
    /// Response body exactly as the POS returned it.
    pub raw_snapshot: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PosClient: Send + Sync {
    async fn get_invoice_by_code(&self, code: &str) -> Result<InvoiceDetail, PosError>;

    /// Whether the same POS invoice may be redeemed more than once.
    fn allows_same_invoice_redemption(&self) -> bool;
}

#[derive(Deserialize)]
struct InvoiceReply {
    order_no: String,
    total_amount: Decimal,
    #[serde(default)]
    line_items: Vec<LineItem>,
}

#[derive(Deserialize)]
struct PosErrorReply {
    message: Option<String>,
}

fn parse_invoice(body: String) -> Result<InvoiceDetail, PosError> {
    let reply: InvoiceReply =
        serde_json::from_str(&body).map_err(|e| PosError::Malformed(e.to_string()))?;
    Ok(InvoiceDetail {
        order_no: reply.order_no,
        total_amount: reply.total_amount,
        line_items: reply.line_items,
        raw_snapshot: body,
    })
}

#[derive(Clone)]
pub struct HttpPosClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    allow_same_invoice: bool,
}

impl HttpPosClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        allow_same_invoice: bool,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            allow_same_invoice,
        }
    }
}

#[async_trait]
impl PosClient for HttpPosClient {
    async fn get_invoice_by_code(&self, code: &str) -> Result<InvoiceDetail, PosError> {
        let response = self
            .http
            .get(format!("{}/invoices/{}", self.base_url, code))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| PosError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PosError::NotFound(code.to_string()));
        }
        if !status.is_success() {
            let message = response
                .json::<PosErrorReply>()
                .await
                .ok()
                .and_then(|reply| reply.message)
                .unwrap_or_else(|| status.to_string());
            return Err(PosError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| PosError::Transport(e.to_string()))?;
        debug!(invoice_code = %code, "POS invoice fetched");
        parse_invoice(body)
    }

    fn allows_same_invoice_redemption(&self) -> bool {
        self.allow_same_invoice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_invoice_keeps_raw_body() {
        let body = r#"{"order_no":"SO-77","total_amount":"125000.50","line_items":[{"name":"Iced tea","quantity":2,"price":"15000"}],"cashier":"Dewi"}"#;

        let detail = parse_invoice(body.to_string()).unwrap();

        assert_eq!(detail.order_no, "SO-77");
        assert_eq!(detail.total_amount, Decimal::new(12_500_050, 2));
        assert_eq!(detail.line_items.len(), 1);
        assert!(detail.raw_snapshot.contains("\"cashier\":\"Dewi\""));
    }

    #[test]
    fn test_parse_invoice_rejects_missing_total() {
        let result = parse_invoice(r#"{"order_no":"SO-1"}"#.to_string());
        assert!(matches!(result, Err(PosError::Malformed(_))));
    }
}
