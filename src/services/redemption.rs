//! Turns an in-café POS invoice into loyalty points.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{PosClient, PosError};
use crate::models::{Platform, PointCredit, PointSource, RedeemRecord};
use crate::services::points::PointCalculator;
use crate::services::publisher::{BadgeTrigger, EventPublisher};
use crate::store::Store;
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedemptionReceipt {
    pub points: i64,
    pub invoice_code: String,
}

pub struct RedemptionService {
    store: Arc<dyn Store>,
    pos: Arc<dyn PosClient>,
    calculator: PointCalculator,
    publisher: EventPublisher,
}

fn redeem_id() -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("RDM-{}", nonce[..16].to_ascii_uppercase())
}

fn already_redeemed(invoice_code: &str) -> AppError {
    AppError::Conflict(format!("Invoice '{}' has already been redeemed", invoice_code))
}

impl RedemptionService {
    pub fn new(
        store: Arc<dyn Store>,
        pos: Arc<dyn PosClient>,
        calculator: PointCalculator,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            store,
            pos,
            calculator,
            publisher,
        }
    }

    pub async fn redeem(
        &self,
        user_id: Uuid,
        invoice_code: &str,
        platform: &str,
    ) -> Result<RedemptionReceipt, AppError> {
        let invoice_code = invoice_code.trim();
        if invoice_code.is_empty() {
            return Err(AppError::ValidationError("invoice_code is required".to_string()));
        }
        let platform: Platform = platform.parse().map_err(AppError::ValidationError)?;

        let unique = !self.pos.allows_same_invoice_redemption();

        // Checked before the POS call so a rejected request costs no API quota.
        if unique && self.store.exists_invoice_code(invoice_code).await? {
            return Err(already_redeemed(invoice_code));
        }

        let invoice = self
            .pos
            .get_invoice_by_code(invoice_code)
            .await
            .map_err(|e| match e {
                PosError::NotFound(_) => AppError::NotFound(e.to_string()),
                other => {
                    warn!(error = %other, invoice_code, "POS lookup failed");
                    AppError::ExternalServiceError(other.to_string())
                }
            })?;

        let points = self.calculator.compute_redeem_points(invoice.total_amount);

        let mut uow = self.store.begin().await?;
        uow.lock_invoice_code(invoice_code).await?;
        if unique && uow.exists_invoice_code(invoice_code).await? {
            uow.rollback().await?;
            return Err(already_redeemed(invoice_code));
        }

        let record = RedeemRecord {
            id: redeem_id(),
            user_id,
            invoice_code: invoice_code.to_string(),
            amount: invoice.total_amount,
            point: points,
            invoice_snapshot: invoice.raw_snapshot,
            platform,
            created_at: Utc::now(),
        };
        uow.insert_redeem_record(&record).await?;
        if points > 0 {
            uow.insert_point_credit(&PointCredit::new(
                user_id,
                PointSource::Redeem,
                invoice_code,
                points,
            ))
            .await?;
        }
        uow.commit().await?;

        info!(
            user_id = %user_id,
            invoice_code,
            order_no = %invoice.order_no,
            points,
            platform = platform.as_str(),
            "POS invoice redeemed"
        );

        self.publisher
            .badge_check(user_id, BadgeTrigger::TotalSpend, invoice_code);

        Ok(RedemptionReceipt {
            points,
            invoice_code: invoice_code.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::pos::MockPosClient;
    use crate::clients::InvoiceDetail;
    use crate::services::publisher::OutboundEvent;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn invoice(code: &str, total: i64) -> InvoiceDetail {
        InvoiceDetail {
            order_no: format!("ORD-{}", code),
            total_amount: Decimal::from(total),
            line_items: Vec::new(),
            raw_snapshot: format!(r#"{{"order_no":"ORD-{}","total_amount":{}}}"#, code, total),
        }
    }

    fn service(
        store: &MemoryStore,
        pos: MockPosClient,
    ) -> (RedemptionService, UnboundedReceiver<OutboundEvent>) {
        let (publisher, events) = EventPublisher::channel();
        let calculator = PointCalculator::new(Decimal::from(1000)).unwrap();
        (
            RedemptionService::new(Arc::new(store.clone()), Arc::new(pos), calculator, publisher),
            events,
        )
    }

    fn pos(allow_same_invoice: bool, lookups: usize) -> MockPosClient {
        let mut pos = MockPosClient::new();
        pos.expect_allows_same_invoice_redemption()
            .return_const(allow_same_invoice);
        pos.expect_get_invoice_by_code()
            .times(lookups)
            .returning(|code| Ok(invoice(code, 150_000)));
        pos
    }

    #[tokio::test]
    async fn test_second_redemption_rejected_before_pos_call() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let (redemptions, mut events) = service(&store, pos(false, 1));

        let receipt = redemptions.redeem(user_id, "INV-100", "android").await.unwrap();
        assert_eq!(receipt.points, 150);
        assert_eq!(receipt.invoice_code, "INV-100");

        let err = redemptions
            .redeem(user_id, "INV-100", "android")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let records = store.redeem_records().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].id.starts_with("RDM-"));
        assert_eq!(records[0].platform, Platform::Android);
        assert!(records[0].invoice_snapshot.contains("ORD-INV-100"));

        let credits = store.point_credits().await;
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].source, PointSource::Redeem);
        assert_eq!(credits[0].point, 150);

        assert!(matches!(
            events.try_recv(),
            Ok(OutboundEvent::BadgeCheck(check)) if check.trigger == BadgeTrigger::TotalSpend
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invoice_cannot_move_between_users() {
        let store = MemoryStore::new();
        let (redemptions, _events) = service(&store, pos(false, 1));

        redemptions
            .redeem(Uuid::new_v4(), "INV-200", "web")
            .await
            .unwrap();
        let err = redemptions
            .redeem(Uuid::new_v4(), "INV-200", "web")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_same_invoice_allowed_when_configured() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let (redemptions, _events) = service(&store, pos(true, 2));

        redemptions.redeem(user_id, "INV-100", "ios").await.unwrap();
        redemptions.redeem(user_id, "INV-100", "ios").await.unwrap();

        assert_eq!(store.redeem_records().await.len(), 2);
        assert_eq!(store.point_credits().await.len(), 2);
    }

    #[tokio::test]
    async fn test_pos_errors_surface_without_writes() {
        let store = MemoryStore::new();
        let mut pos = MockPosClient::new();
        pos.expect_allows_same_invoice_redemption().return_const(false);
        pos.expect_get_invoice_by_code()
            .times(2)
            .returning(|code| match code {
                "INV-404" => Err(PosError::NotFound(code.to_string())),
                _ => Err(PosError::Upstream {
                    status: 500,
                    message: "cashier offline".to_string(),
                }),
            });
        let (redemptions, mut events) = service(&store, pos);

        let err = redemptions
            .redeem(Uuid::new_v4(), "INV-404", "web")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = redemptions
            .redeem(Uuid::new_v4(), "INV-500", "web")
            .await
            .unwrap_err();
        assert!(matches!(&err, AppError::ExternalServiceError(msg) if msg.contains("cashier offline")));

        assert!(store.redeem_records().await.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bad_input_rejected_before_pos_call() {
        let store = MemoryStore::new();
        let (redemptions, _events) = service(&store, pos(false, 0));

        let err = redemptions
            .redeem(Uuid::new_v4(), "INV-1", "blackberry")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = redemptions.redeem(Uuid::new_v4(), "  ", "web").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
