//! Shared builders for service tests.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::clients::gateway::MockPaymentGateway;
use crate::clients::{GatewayError, GatewayInvoice, InvoiceRequest};
use crate::models::{
    Notification, Participant, ParticipantStatus, PaymentAudit, PointCredit, RedeemRecord,
    Resource, ResourceKind, ResourceStatus, Tier, Transaction, TransactionStatus, User,
};
use crate::store::{MemoryStore, Store, StoreResult, UnitOfWork};

pub const PRICE: i64 = 50_000;
pub const PARTICIPATION_POINT: i64 = 20;

pub fn user(name: &str) -> User {
    User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        player_token: Some(format!("player-{}", name.to_lowercase())),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn tournament(code: &str, status: ResourceStatus, max_participant: i32) -> Resource {
    Resource {
        kind: ResourceKind::Tournament,
        code: code.to_string(),
        name: format!("Tournament {}", code),
        status,
        max_participant,
        price: Decimal::from(PRICE),
        participation_point: PARTICIPATION_POINT,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn pending_transaction(code: &str, user_id: Uuid, resource: &Resource) -> Transaction {
    Transaction {
        code: code.to_string(),
        user_id,
        data_source: resource.kind,
        source_code: resource.code.clone(),
        price: resource.price,
        status: TransactionStatus::Pending,
        invoice_id: format!("inv-{}", code),
        invoice_url: format!("https://pay.example.com/{}", code),
        expires_at: Utc::now() + Duration::hours(24),
        payment_method: None,
        raw_payload: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Seeds a user holding a pending booking with a live invoice.
pub async fn seed_pending_booking(
    store: &MemoryStore,
    resource: &Resource,
    user: &User,
    transaction_code: &str,
) -> Participant {
    let mut participant = Participant::new(resource.kind, &resource.code, user.id);
    participant.status = ParticipantStatus::Pending;
    participant.transaction_code = Some(transaction_code.to_string());
    participant.participation_point = resource.participation_point;

    store
        .put_transaction(pending_transaction(transaction_code, user.id, resource))
        .await;
    store.put_participant(participant.clone()).await;
    participant
}

/// Stand-in for the provider: opens an invoice for whatever it is asked.
pub fn open_invoice(request: InvoiceRequest) -> Result<GatewayInvoice, GatewayError> {
    Ok(GatewayInvoice {
        invoice_id: format!("inv-{}", request.transaction_code),
        invoice_url: format!("https://pay.example.com/{}", request.transaction_code),
        transaction_code: request.transaction_code,
        expires_at: Utc::now() + Duration::hours(24),
    })
}

/// Gateway expected to open exactly `times` invoices.
pub fn accepting_gateway(times: usize) -> MockPaymentGateway {
    let mut gateway = MockPaymentGateway::new();
    gateway
        .expect_create_invoice()
        .times(times)
        .returning(open_invoice);
    gateway
}

/// Row-lock order every booking-state writer follows inside a unit of work.
pub const BOOKING_LOCK_ORDER: [&str; 3] = ["resource", "participant", "transaction"];

/// Wraps a [`MemoryStore`] and records which rows a unit of work locks, in
/// order. Postgres deadlocks when two writers lock the same rows in
/// different orders; the memory store alone cannot show that.
#[derive(Clone)]
pub struct LockTracingStore {
    inner: MemoryStore,
    locks: Arc<StdMutex<Vec<&'static str>>>,
    stale_resource: Option<Resource>,
}

impl LockTracingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            locks: Arc::default(),
            stale_resource: None,
        }
    }

    /// Unlocked reads return `resource` while locked reads see the stored
    /// row, as if it was edited between the two.
    pub fn with_stale_resource(mut self, resource: Resource) -> Self {
        self.stale_resource = Some(resource);
        self
    }

    pub fn locks(&self) -> Vec<&'static str> {
        self.locks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for LockTracingStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(LockTracingUnitOfWork {
            inner: self.inner.begin().await?,
            locks: self.locks.clone(),
        }))
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        self.inner.find_user(user_id).await
    }

    async fn find_resource_by_code(
        &self,
        kind: ResourceKind,
        code: &str,
    ) -> StoreResult<Option<Resource>> {
        if let Some(stale) = &self.stale_resource {
            if stale.kind == kind && stale.code == code {
                return Ok(Some(stale.clone()));
            }
        }
        self.inner.find_resource_by_code(kind, code).await
    }

    async fn find_participant(
        &self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>> {
        self.inner.find_participant(kind, resource_code, user_id).await
    }

    async fn count_used_slots(&self, kind: ResourceKind, resource_code: &str) -> StoreResult<i64> {
        self.inner.count_used_slots(kind, resource_code).await
    }

    async fn find_transaction(&self, code: &str) -> StoreResult<Option<Transaction>> {
        self.inner.find_transaction(code).await
    }

    async fn exists_invoice_code(&self, invoice_code: &str) -> StoreResult<bool> {
        self.inner.exists_invoice_code(invoice_code).await
    }

    async fn total_points(&self, user_id: Uuid) -> StoreResult<i64> {
        self.inner.total_points(user_id).await
    }

    async fn list_tiers(&self) -> StoreResult<Vec<Tier>> {
        self.inner.list_tiers().await
    }
}

struct LockTracingUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    locks: Arc<StdMutex<Vec<&'static str>>>,
}

impl LockTracingUnitOfWork {
    fn record(&self, row: &'static str) {
        self.locks.lock().unwrap().push(row);
    }
}

#[async_trait]
impl UnitOfWork for LockTracingUnitOfWork {
    async fn lock_resource(
        &mut self,
        kind: ResourceKind,
        code: &str,
    ) -> StoreResult<Option<Resource>> {
        self.record("resource");
        self.inner.lock_resource(kind, code).await
    }

    async fn update_resource(&mut self, resource: &Resource) -> StoreResult<()> {
        self.inner.update_resource(resource).await
    }

    async fn delete_resource(&mut self, kind: ResourceKind, code: &str) -> StoreResult<()> {
        self.inner.delete_resource(kind, code).await
    }

    async fn count_used_slots(
        &mut self,
        kind: ResourceKind,
        resource_code: &str,
    ) -> StoreResult<i64> {
        self.inner.count_used_slots(kind, resource_code).await
    }

    async fn find_participant(
        &mut self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>> {
        self.record("participant");
        self.inner.find_participant(kind, resource_code, user_id).await
    }

    async fn upsert_participant(&mut self, participant: &Participant) -> StoreResult<()> {
        self.inner.upsert_participant(participant).await
    }

    async fn find_transaction(&mut self, code: &str) -> StoreResult<Option<Transaction>> {
        self.record("transaction");
        self.inner.find_transaction(code).await
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        self.inner.insert_transaction(transaction).await
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        self.inner.update_transaction(transaction).await
    }

    async fn append_payment_audit(&mut self, audit: &PaymentAudit) -> StoreResult<()> {
        self.inner.append_payment_audit(audit).await
    }

    async fn insert_point_credit(&mut self, credit: &PointCredit) -> StoreResult<()> {
        self.inner.insert_point_credit(credit).await
    }

    async fn lock_invoice_code(&mut self, invoice_code: &str) -> StoreResult<()> {
        self.inner.lock_invoice_code(invoice_code).await
    }

    async fn exists_invoice_code(&mut self, invoice_code: &str) -> StoreResult<bool> {
        self.inner.exists_invoice_code(invoice_code).await
    }

    async fn insert_redeem_record(&mut self, record: &RedeemRecord) -> StoreResult<()> {
        self.inner.insert_redeem_record(record).await
    }

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        self.inner.insert_notification(notification).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}
