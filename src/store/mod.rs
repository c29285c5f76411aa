//! Data-store contract used by the booking core.
//!
//! [`Store`] exposes the optimistic reads the services use for fast
//! user-facing checks. Every mutating sequence runs through a
//! [`UnitOfWork`] obtained from [`Store::begin`]: nothing it writes is
//! visible until [`UnitOfWork::commit`], and dropping it without committing
//! discards all of its writes.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Notification, Participant, PaymentAudit, PointCredit, RedeemRecord, Resource, ResourceKind,
    Tier, Transaction, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    async fn find_resource_by_code(
        &self,
        kind: ResourceKind,
        code: &str,
    ) -> StoreResult<Option<Resource>>;

    async fn find_participant(
        &self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>>;

    /// Number of participants whose status is pending or active.
    async fn count_used_slots(&self, kind: ResourceKind, resource_code: &str) -> StoreResult<i64>;

    async fn find_transaction(&self, code: &str) -> StoreResult<Option<Transaction>>;

    async fn exists_invoice_code(&self, invoice_code: &str) -> StoreResult<bool>;

    async fn total_points(&self, user_id: Uuid) -> StoreResult<i64>;

    async fn list_tiers(&self) -> StoreResult<Vec<Tier>>;
}

/// One atomic unit of work. Reads inside it take row locks where the
/// backend supports them, so a check made here still holds at commit.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Reads the resource and holds it against concurrent bookings until
    /// commit or rollback.
    async fn lock_resource(
        &mut self,
        kind: ResourceKind,
        code: &str,
    ) -> StoreResult<Option<Resource>>;

    async fn update_resource(&mut self, resource: &Resource) -> StoreResult<()>;

    async fn delete_resource(&mut self, kind: ResourceKind, code: &str) -> StoreResult<()>;

    async fn count_used_slots(&mut self, kind: ResourceKind, resource_code: &str)
        -> StoreResult<i64>;

    async fn find_participant(
        &mut self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>>;

    async fn upsert_participant(&mut self, participant: &Participant) -> StoreResult<()>;

    async fn find_transaction(&mut self, code: &str) -> StoreResult<Option<Transaction>>;

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;

    async fn update_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;

    async fn append_payment_audit(&mut self, audit: &PaymentAudit) -> StoreResult<()>;

    async fn insert_point_credit(&mut self, credit: &PointCredit) -> StoreResult<()>;

    /// Serialises redemptions of the same invoice code until commit.
    async fn lock_invoice_code(&mut self, invoice_code: &str) -> StoreResult<()>;

    async fn exists_invoice_code(&mut self, invoice_code: &str) -> StoreResult<bool>;

    async fn insert_redeem_record(&mut self, record: &RedeemRecord) -> StoreResult<()>;

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
