//! Applies payment-provider callbacks to stored booking state.
//!
//! Provider retries are expected: a callback for a transaction that already
//! reached a terminal status is acknowledged without touching anything.
//!
//! Rows are locked in the same order as a booking takes them: resource,
//! participant, then transaction.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    Participant, ParticipantStatus, PaymentAudit, PointCredit, PointSource, Transaction,
    TransactionStatus,
};
use crate::services::points::PointCalculator;
use crate::services::publisher::{BadgeTrigger, EventPublisher, NotificationDraft};
use crate::store::{Store, UnitOfWork};
use crate::utils::error::AppError;

/// A provider callback, already authenticated at the transport boundary.
#[derive(Debug, Clone)]
pub struct PaymentCallback {
    pub external_id: String,
    pub amount: Decimal,
    pub payment_method: String,
    pub status: String,
    /// Request body as received, stored for audit.
    pub raw_payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Applied {
        transaction_code: String,
        status: TransactionStatus,
    },
    AlreadyProcessed {
        transaction_code: String,
        status: TransactionStatus,
    },
}

/// Effect of a callback on the participant row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParticipantEffect {
    Activated,
    Cancelled,
    /// Paid, but the participant no longer waits on a payment (already
    /// active through another transaction, or cancelled). The money has to
    /// go back.
    RefundDue,
    Untouched,
}

pub struct PaymentReconciler {
    store: Arc<dyn Store>,
    calculator: PointCalculator,
    publisher: EventPublisher,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn Store>, calculator: PointCalculator, publisher: EventPublisher) -> Self {
        Self {
            store,
            calculator,
            publisher,
        }
    }

    pub async fn apply_payment_callback(
        &self,
        callback: PaymentCallback,
    ) -> Result<CallbackOutcome, AppError> {
        let external_id = callback.external_id.trim();
        if external_id.is_empty() {
            return Err(AppError::ValidationError("external_id is required".to_string()));
        }
        let new_status = TransactionStatus::from_provider(&callback.status).ok_or_else(|| {
            AppError::ValidationError(format!(
                "status '{}' is not a final payment status",
                callback.status
            ))
        })?;

        // Owner and source never change after insert, so an unlocked read is
        // enough to know which rows to lock.
        let located = self
            .store
            .find_transaction(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound("unknown transaction".to_string()))?;

        let mut uow = self.store.begin().await?;

        uow.lock_resource(located.data_source, &located.source_code)
            .await?;
        let participant = uow
            .find_participant(located.data_source, &located.source_code, located.user_id)
            .await?;
        let mut transaction = uow
            .find_transaction(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound("unknown transaction".to_string()))?;

        if callback.amount != transaction.price {
            error!(
                transaction_code = %transaction.code,
                stored_price = %transaction.price,
                reported_amount = %callback.amount,
                "Callback amount does not match stored price"
            );
            uow.rollback().await?;
            return Err(AppError::Inconsistency(format!(
                "reported amount {} does not match transaction price {}",
                callback.amount, transaction.price
            )));
        }

        if transaction.status.is_terminal() {
            uow.rollback().await?;
            info!(
                transaction_code = %transaction.code,
                status = transaction.status.as_str(),
                reported_status = %callback.status,
                "Callback for settled transaction ignored"
            );
            return Ok(CallbackOutcome::AlreadyProcessed {
                transaction_code: transaction.code,
                status: transaction.status,
            });
        }

        let now = Utc::now();
        transaction.status = new_status;
        transaction.payment_method = Some(callback.payment_method.clone());
        transaction.raw_payload = Some(callback.raw_payload.clone());
        transaction.updated_at = now;
        uow.update_transaction(&transaction).await?;
        uow.append_payment_audit(&PaymentAudit {
            id: Uuid::new_v4(),
            transaction_code: transaction.code.clone(),
            status: new_status,
            payment_method: callback.payment_method.clone(),
            received_at: now,
        })
        .await?;

        let effect = match participant {
            Some(participant) => {
                self.apply_to_participant(uow.as_mut(), participant, &transaction)
                    .await?
            }
            None => {
                warn!(
                    transaction_code = %transaction.code,
                    user_id = %transaction.user_id,
                    "No participant for transaction, only the transaction was updated"
                );
                ParticipantEffect::Untouched
            }
        };

        uow.commit().await?;

        info!(
            transaction_code = %transaction.code,
            status = new_status.as_str(),
            effect = ?effect,
            "Payment callback applied"
        );

        self.publish_side_effects(&transaction, effect);

        Ok(CallbackOutcome::Applied {
            transaction_code: transaction.code,
            status: new_status,
        })
    }

    /// A paid transaction admits a pending participant even when a newer
    /// invoice has since been opened for it: the captured payment wins and
    /// the participant is re-linked to it. Any other status only moves the
    /// participant when this transaction is the one it is linked to.
    async fn apply_to_participant(
        &self,
        uow: &mut dyn UnitOfWork,
        mut participant: Participant,
        transaction: &Transaction,
    ) -> Result<ParticipantEffect, AppError> {
        let linked = participant.transaction_code.as_deref() == Some(transaction.code.as_str());
        let paid = transaction.status == TransactionStatus::Paid;

        let effect = match participant.status {
            ParticipantStatus::Pending if paid => {
                if !linked {
                    warn!(
                        transaction_code = %transaction.code,
                        superseded_by = ?participant.transaction_code,
                        user_id = %transaction.user_id,
                        "Earlier invoice paid, re-linking participant to it"
                    );
                }
                participant.status = ParticipantStatus::Active;
                participant.transaction_code = Some(transaction.code.clone());
                ParticipantEffect::Activated
            }
            ParticipantStatus::Pending if linked => {
                participant.status = ParticipantStatus::Cancel;
                ParticipantEffect::Cancelled
            }
            _ if paid => {
                error!(
                    transaction_code = %transaction.code,
                    participant_transaction = ?participant.transaction_code,
                    participant_status = participant.status.as_str(),
                    user_id = %transaction.user_id,
                    amount = %transaction.price,
                    "Payment cannot be applied to the booking, refund required"
                );
                return Ok(ParticipantEffect::RefundDue);
            }
            _ => {
                warn!(
                    transaction_code = %transaction.code,
                    participant_status = participant.status.as_str(),
                    "Participant not linked to transaction, left unchanged"
                );
                return Ok(ParticipantEffect::Untouched);
            }
        };

        participant.updated_at = Utc::now();
        uow.upsert_participant(&participant).await?;

        if effect == ParticipantEffect::Activated {
            let paid_points = self.calculator.compute_redeem_points(transaction.price);
            if paid_points > 0 {
                uow.insert_point_credit(&PointCredit::new(
                    transaction.user_id,
                    PointSource::Payment,
                    &transaction.code,
                    paid_points,
                ))
                .await?;
            }
            if participant.participation_point > 0 {
                uow.insert_point_credit(&PointCredit::new(
                    transaction.user_id,
                    PointSource::Participation,
                    &transaction.code,
                    participant.participation_point,
                ))
                .await?;
            }
        }

        Ok(effect)
    }

    fn publish_side_effects(&self, transaction: &Transaction, effect: ParticipantEffect) {
        self.publisher
            .badge_check(transaction.user_id, BadgeTrigger::Booking, &transaction.code);
        if transaction.status == TransactionStatus::Paid {
            self.publisher
                .badge_check(transaction.user_id, BadgeTrigger::TotalSpend, &transaction.code);
        }

        let (title, body) = match (transaction.status, effect) {
            (TransactionStatus::Paid, ParticipantEffect::Activated) => (
                "Payment successful".to_string(),
                format!(
                    "Your booking for {} {} is confirmed.",
                    transaction.data_source, transaction.source_code
                ),
            ),
            (TransactionStatus::Paid, ParticipantEffect::RefundDue) => (
                "Duplicate payment received".to_string(),
                format!(
                    "You already hold a booking for {} {}. Payment {} will be refunded.",
                    transaction.data_source, transaction.source_code, transaction.code
                ),
            ),
            (TransactionStatus::Paid, _) => (
                "Payment received".to_string(),
                format!("We received your payment {}.", transaction.code),
            ),
            (TransactionStatus::Expired, _) => (
                "Payment expired".to_string(),
                format!(
                    "Your invoice for {} {} expired. Book again to get a new one.",
                    transaction.data_source, transaction.source_code
                ),
            ),
            _ => (
                "Payment failed".to_string(),
                format!(
                    "Your payment for {} {} did not go through.",
                    transaction.data_source, transaction.source_code
                ),
            ),
        };

        self.publisher.notify(NotificationDraft {
            receiver: transaction.user_id,
            category: "payment".to_string(),
            title,
            body,
            image: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceStatus;
    use crate::services::fixtures;
    use crate::services::publisher::{BadgeCheck, OutboundEvent};
    use crate::store::MemoryStore;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        store: MemoryStore,
        reconciler: PaymentReconciler,
        events: UnboundedReceiver<OutboundEvent>,
        participant: Participant,
    }

    async fn harness() -> Harness {
        let store = MemoryStore::new();
        let resource = fixtures::tournament("T-001", ResourceStatus::Active, 1);
        let user = fixtures::user("Ayu");
        store.put_resource(resource.clone()).await;
        store.put_user(user.clone()).await;
        let participant = fixtures::seed_pending_booking(&store, &resource, &user, "TRX-1").await;

        let (publisher, events) = EventPublisher::channel();
        let calculator = PointCalculator::new(Decimal::from(1000)).unwrap();
        let reconciler = PaymentReconciler::new(Arc::new(store.clone()), calculator, publisher);

        Harness {
            store,
            reconciler,
            events,
            participant,
        }
    }

    fn callback(status: &str, amount: i64) -> PaymentCallback {
        PaymentCallback {
            external_id: "TRX-1".to_string(),
            amount: Decimal::from(amount),
            payment_method: "QRIS".to_string(),
            status: status.to_string(),
            raw_payload: format!(r#"{{"external_id":"TRX-1","status":"{}"}}"#, status),
        }
    }

    fn drain(events: &mut UnboundedReceiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn badge_triggers(events: &[OutboundEvent]) -> Vec<BadgeTrigger> {
        events
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::BadgeCheck(BadgeCheck { trigger, .. }) => Some(*trigger),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_paid_callback_activates_and_awards_points() {
        let mut h = harness().await;

        let outcome = h
            .reconciler
            .apply_payment_callback(callback("PAID", fixtures::PRICE))
            .await
            .unwrap();
        assert!(matches!(outcome, CallbackOutcome::Applied { status: TransactionStatus::Paid, .. }));

        let participants = h.store.participants().await;
        assert_eq!(participants[0].id, h.participant.id);
        assert_eq!(participants[0].status, ParticipantStatus::Active);

        let credits = h.store.point_credits().await;
        assert_eq!(credits.len(), 2);
        let payment = credits.iter().find(|c| c.source == PointSource::Payment).unwrap();
        assert_eq!(payment.point, 50);
        let participation = credits
            .iter()
            .find(|c| c.source == PointSource::Participation)
            .unwrap();
        assert_eq!(participation.point, fixtures::PARTICIPATION_POINT);

        let transactions = h.store.transactions().await;
        assert_eq!(transactions[0].status, TransactionStatus::Paid);
        assert_eq!(transactions[0].payment_method.as_deref(), Some("QRIS"));
        assert!(transactions[0].raw_payload.as_deref().unwrap().contains("PAID"));
        assert_eq!(h.store.payment_audits().await.len(), 1);

        let events = drain(&mut h.events);
        assert_eq!(
            badge_triggers(&events),
            vec![BadgeTrigger::Booking, BadgeTrigger::TotalSpend]
        );
        let notifications: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::Notification(draft) => Some(draft),
                _ => None,
            })
            .collect();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Payment successful");
    }

    #[tokio::test]
    async fn test_replayed_callback_is_a_no_op() {
        let mut h = harness().await;

        h.reconciler
            .apply_payment_callback(callback("PAID", fixtures::PRICE))
            .await
            .unwrap();
        drain(&mut h.events);

        let outcome = h
            .reconciler
            .apply_payment_callback(callback("PAID", fixtures::PRICE))
            .await
            .unwrap();
        assert!(matches!(outcome, CallbackOutcome::AlreadyProcessed { .. }));

        assert_eq!(h.store.participants().await[0].status, ParticipantStatus::Active);
        assert_eq!(h.store.point_credits().await.len(), 2);
        assert_eq!(h.store.payment_audits().await.len(), 1);
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn test_late_expiry_after_payment_changes_nothing() {
        let mut h = harness().await;
        h.reconciler
            .apply_payment_callback(callback("PAID", fixtures::PRICE))
            .await
            .unwrap();
        drain(&mut h.events);

        let outcome = h
            .reconciler
            .apply_payment_callback(callback("EXPIRED", fixtures::PRICE))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::AlreadyProcessed {
                transaction_code: "TRX-1".to_string(),
                status: TransactionStatus::Paid,
            }
        );
        assert_eq!(h.store.participants().await[0].status, ParticipantStatus::Active);
    }

    #[tokio::test]
    async fn test_amount_mismatch_leaves_state_unchanged() {
        let mut h = harness().await;

        let err = h
            .reconciler
            .apply_payment_callback(callback("PAID", fixtures::PRICE - 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Inconsistency(_)));

        assert_eq!(h.store.participants().await[0].status, ParticipantStatus::Pending);
        assert_eq!(h.store.transactions().await[0].status, TransactionStatus::Pending);
        assert!(h.store.point_credits().await.is_empty());
        assert!(h.store.payment_audits().await.is_empty());
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn test_expired_callback_cancels_without_points() {
        let mut h = harness().await;

        h.reconciler
            .apply_payment_callback(callback("EXPIRED", fixtures::PRICE))
            .await
            .unwrap();

        assert_eq!(h.store.participants().await[0].status, ParticipantStatus::Cancel);
        assert_eq!(h.store.transactions().await[0].status, TransactionStatus::Expired);
        assert!(h.store.point_credits().await.is_empty());

        let events = drain(&mut h.events);
        assert_eq!(badge_triggers(&events), vec![BadgeTrigger::Booking]);
        assert!(events.iter().any(|e| matches!(
            e,
            OutboundEvent::Notification(draft) if draft.title == "Payment expired"
        )));
    }

    #[tokio::test]
    async fn test_unknown_transaction_rejected() {
        let h = harness().await;
        let mut unknown = callback("PAID", fixtures::PRICE);
        unknown.external_id = "TRX-404".to_string();

        let err = h.reconciler.apply_payment_callback(unknown).await.unwrap_err();
        assert!(matches!(&err, AppError::NotFound(msg) if msg == "unknown transaction"));
    }

    #[tokio::test]
    async fn test_non_final_status_rejected_before_lookup() {
        let h = harness().await;
        let err = h
            .reconciler
            .apply_payment_callback(callback("PENDING", fixtures::PRICE))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    /// Re-points the pending participant at a newer invoice, as a retry
    /// after local expiry does.
    async fn rebook_with(h: &Harness, code: &str) {
        let resource = fixtures::tournament("T-001", ResourceStatus::Active, 1);
        let mut rebooked = h.participant.clone();
        rebooked.transaction_code = Some(code.to_string());
        h.store.put_participant(rebooked).await;
        h.store
            .put_transaction(fixtures::pending_transaction(
                code,
                h.participant.user_id,
                &resource,
            ))
            .await;
    }

    fn transaction_status(transactions: &[Transaction], code: &str) -> TransactionStatus {
        transactions
            .iter()
            .find(|t| t.code == code)
            .map(|t| t.status)
            .unwrap()
    }

    #[tokio::test]
    async fn test_paid_superseded_invoice_admits_participant() {
        let mut h = harness().await;
        rebook_with(&h, "TRX-2").await;

        h.reconciler
            .apply_payment_callback(callback("PAID", fixtures::PRICE))
            .await
            .unwrap();

        let participant = &h.store.participants().await[0];
        assert_eq!(participant.status, ParticipantStatus::Active);
        assert_eq!(participant.transaction_code.as_deref(), Some("TRX-1"));

        let credits = h.store.point_credits().await;
        assert_eq!(credits.len(), 2);
        assert!(credits.iter().all(|c| c.reference == "TRX-1"));

        let transactions = h.store.transactions().await;
        assert_eq!(transaction_status(&transactions, "TRX-1"), TransactionStatus::Paid);
        assert_eq!(transaction_status(&transactions, "TRX-2"), TransactionStatus::Pending);

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            OutboundEvent::Notification(draft) if draft.title == "Payment successful"
        )));
    }

    #[tokio::test]
    async fn test_second_payment_for_active_booking_is_flagged_for_refund() {
        let mut h = harness().await;
        rebook_with(&h, "TRX-2").await;

        h.reconciler
            .apply_payment_callback(callback("PAID", fixtures::PRICE))
            .await
            .unwrap();
        drain(&mut h.events);

        let mut second = callback("PAID", fixtures::PRICE);
        second.external_id = "TRX-2".to_string();
        h.reconciler.apply_payment_callback(second).await.unwrap();

        let participant = &h.store.participants().await[0];
        assert_eq!(participant.status, ParticipantStatus::Active);
        assert_eq!(participant.transaction_code.as_deref(), Some("TRX-1"));
        assert_eq!(h.store.point_credits().await.len(), 2);
        assert_eq!(
            transaction_status(&h.store.transactions().await, "TRX-2"),
            TransactionStatus::Paid
        );

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            OutboundEvent::Notification(draft) if draft.title == "Duplicate payment received"
        )));
    }

    #[tokio::test]
    async fn test_expired_superseded_invoice_leaves_participant_alone() {
        let h = harness().await;
        rebook_with(&h, "TRX-2").await;

        h.reconciler
            .apply_payment_callback(callback("EXPIRED", fixtures::PRICE))
            .await
            .unwrap();

        let participant = &h.store.participants().await[0];
        assert_eq!(participant.status, ParticipantStatus::Pending);
        assert_eq!(participant.transaction_code.as_deref(), Some("TRX-2"));
        assert!(h.store.point_credits().await.is_empty());
    }

    #[tokio::test]
    async fn test_callback_locks_rows_in_booking_order() {
        let h = harness().await;
        let traced = fixtures::LockTracingStore::new(h.store.clone());
        let (publisher, _events) = EventPublisher::channel();
        let reconciler = PaymentReconciler::new(
            Arc::new(traced.clone()),
            PointCalculator::new(Decimal::from(1000)).unwrap(),
            publisher,
        );

        reconciler
            .apply_payment_callback(callback("PAID", fixtures::PRICE))
            .await
            .unwrap();

        assert_eq!(traced.locks(), fixtures::BOOKING_LOCK_ORDER);
    }
}
