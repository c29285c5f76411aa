use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Expired,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Paid => "PAID",
            TransactionStatus::Expired => "EXPIRED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Maps a provider callback status onto a terminal status. `PENDING`
    /// and blank values are not terminal outcomes and yield `None`; any
    /// other unknown value is treated as a failed payment.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status.trim().to_ascii_uppercase().as_str() {
            "" | "PENDING" => None,
            "PAID" | "SETTLED" => Some(TransactionStatus::Paid),
            "EXPIRED" => Some(TransactionStatus::Expired),
            _ => Some(TransactionStatus::Failed),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "PAID" => Ok(TransactionStatus::Paid),
            "EXPIRED" => Ok(TransactionStatus::Expired),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Local tracking record for one external invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub code: String,
    pub user_id: Uuid,
    pub data_source: ResourceKind,
    pub source_code: String,
    pub price: Decimal,
    pub status: TransactionStatus,
    pub invoice_id: String,
    pub invoice_url: String,
    pub expires_at: DateTime<Utc>,
    pub payment_method: Option<String>,
    /// Provider callback body, stored verbatim.
    pub raw_payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A pending invoice that the provider will still accept payment for.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Pending && self.expires_at > now
    }
}

/// Append-only record of each applied callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAudit {
    pub id: Uuid,
    pub transaction_code: String,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_provider_maps_terminal_statuses() {
        assert_eq!(
            TransactionStatus::from_provider("PAID"),
            Some(TransactionStatus::Paid)
        );
        assert_eq!(
            TransactionStatus::from_provider("expired"),
            Some(TransactionStatus::Expired)
        );
        assert_eq!(
            TransactionStatus::from_provider("VOIDED"),
            Some(TransactionStatus::Failed)
        );
    }

    #[test]
    fn test_from_provider_rejects_non_terminal() {
        assert_eq!(TransactionStatus::from_provider("PENDING"), None);
        assert_eq!(TransactionStatus::from_provider("  "), None);
    }
}
