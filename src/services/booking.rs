//! Opens exactly one external invoice per eligible booking attempt.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{InvoiceRequest, PaymentGateway};
use crate::models::{
    Participant, ParticipantStatus, Resource, ResourceKind, Transaction, TransactionStatus,
};
use crate::services::guard::{check_booking_eligibility, Attempt, Eligibility, PendingInvoice};
use crate::store::{Store, UnitOfWork};
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingReceipt {
    pub transaction_code: String,
    pub invoice_url: String,
    pub expires_at: DateTime<Utc>,
    /// True when an invoice the user already held was handed back.
    pub reused: bool,
}

impl From<PendingInvoice> for BookingReceipt {
    fn from(invoice: PendingInvoice) -> Self {
        Self {
            transaction_code: invoice.transaction_code,
            invoice_url: invoice.invoice_url,
            expires_at: invoice.expires_at,
            reused: true,
        }
    }
}

pub fn new_transaction_code(kind: ResourceKind, resource_code: &str) -> String {
    let prefix = match kind {
        ResourceKind::Room => "RM",
        ResourceKind::Tournament => "TR",
    };
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "TRX-{}-{}-{}",
        prefix,
        resource_code,
        nonce[..12].to_ascii_uppercase()
    )
}

pub struct BookingService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
}

impl BookingService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Admits `user_id` into the resource and opens its invoice, or hands
    /// back the live invoice the user already holds.
    pub async fn open_booking_invoice(
        &self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> Result<BookingReceipt, AppError> {
        let resource_code = resource_code.trim();
        if resource_code.is_empty() {
            return Err(AppError::ValidationError(format!("{} code is required", kind)));
        }

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' was not found", user_id)))?;

        if let Some(receipt) = self.precheck(kind, resource_code, user_id).await? {
            return Ok(receipt);
        }

        let mut uow = self.store.begin().await?;

        let resource = uow
            .lock_resource(kind, resource_code)
            .await?
            .ok_or_else(|| not_found(kind, resource_code))?;
        let participant = uow.find_participant(kind, resource_code, user_id).await?;
        let used_slots = uow.count_used_slots(kind, resource_code).await?;
        let transaction = linked_transaction(uow.as_mut(), participant.as_ref()).await?;

        if let Err(e) = ensure_priced(&resource) {
            uow.rollback().await?;
            return Err(e);
        }

        let admission = match check_booking_eligibility(
            &resource,
            used_slots,
            participant.as_ref(),
            transaction.as_ref(),
            Utc::now(),
        ) {
            Eligibility::Deny(reason) => {
                uow.rollback().await?;
                return Err(reason.into_error(kind, Attempt::Book));
            }
            Eligibility::Pending(invoice) => {
                uow.rollback().await?;
                return Ok(invoice.into());
            }
            Eligibility::Allow(admission) => admission,
        };

        let transaction_code = new_transaction_code(kind, resource_code);
        let request = InvoiceRequest {
            user_id,
            source_type: kind,
            source_code: resource_code.to_string(),
            transaction_code: transaction_code.clone(),
            amount: resource.price,
            description: format!("{} booking: {} ({})", kind, resource.name, resource.code),
            payer_email: user.email.clone(),
        };

        // Dropping the unit of work on failure leaves no participant or
        // transaction behind.
        let invoice = self.gateway.create_invoice(request).await.map_err(|e| {
            warn!(error = %e, user_id = %user_id, resource_code, "Invoice creation failed");
            AppError::ExternalServiceError(e.to_string())
        })?;

        let now = Utc::now();
        let transaction = Transaction {
            code: transaction_code.clone(),
            user_id,
            data_source: kind,
            source_code: resource_code.to_string(),
            price: resource.price,
            status: TransactionStatus::Pending,
            invoice_id: invoice.invoice_id,
            invoice_url: invoice.invoice_url,
            expires_at: invoice.expires_at,
            payment_method: None,
            raw_payload: None,
            created_at: now,
            updated_at: now,
        };
        uow.insert_transaction(&transaction).await?;

        let mut participant =
            participant.unwrap_or_else(|| Participant::new(kind, resource_code, user_id));
        participant.status = ParticipantStatus::Pending;
        participant.transaction_code = Some(transaction_code.clone());
        participant.participation_point = resource.participation_point;
        participant.updated_at = now;
        uow.upsert_participant(&participant).await?;

        uow.commit().await?;

        info!(
            user_id = %user_id,
            resource_kind = %kind,
            resource_code,
            transaction_code = %transaction_code,
            admission = ?admission,
            "Booking invoice opened"
        );

        Ok(BookingReceipt {
            transaction_code,
            invoice_url: transaction.invoice_url,
            expires_at: transaction.expires_at,
            reused: false,
        })
    }

    /// Optimistic read-only pass for a fast answer. The unit of work repeats
    /// every check under lock.
    async fn precheck(
        &self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> Result<Option<BookingReceipt>, AppError> {
        let resource = self
            .store
            .find_resource_by_code(kind, resource_code)
            .await?
            .ok_or_else(|| not_found(kind, resource_code))?;

        ensure_priced(&resource)?;

        let participant = self
            .store
            .find_participant(kind, resource_code, user_id)
            .await?;
        let used_slots = self.store.count_used_slots(kind, resource_code).await?;
        let transaction = match participant.as_ref() {
            Some(p) if p.status == ParticipantStatus::Pending => match &p.transaction_code {
                Some(code) => self.store.find_transaction(code).await?,
                None => None,
            },
            _ => None,
        };

        match check_booking_eligibility(
            &resource,
            used_slots,
            participant.as_ref(),
            transaction.as_ref(),
            Utc::now(),
        ) {
            Eligibility::Deny(reason) => Err(reason.into_error(kind, Attempt::Book)),
            Eligibility::Pending(invoice) => Ok(Some(invoice.into())),
            Eligibility::Allow(_) => Ok(None),
        }
    }
}

async fn linked_transaction(
    uow: &mut dyn UnitOfWork,
    participant: Option<&Participant>,
) -> Result<Option<Transaction>, AppError> {
    match participant {
        Some(p) if p.status == ParticipantStatus::Pending => match &p.transaction_code {
            Some(code) => Ok(uow.find_transaction(code).await?),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

/// No invoice can be opened for a free resource.
fn ensure_priced(resource: &Resource) -> Result<(), AppError> {
    if resource.price <= Decimal::ZERO {
        return Err(AppError::ValidationError(format!(
            "This {} has no booking price",
            resource.kind
        )));
    }
    Ok(())
}

fn not_found(kind: ResourceKind, code: &str) -> AppError {
    AppError::NotFound(format!("{} '{}' was not found", kind, code))
}
