//! In-memory store for development and testing.
//!
//! A unit of work holds the single state lock for its whole lifetime and
//! writes into a staged copy, which gives serialisable isolation: two
//! bookings for the same resource can never interleave.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, UnitOfWork};
use crate::models::{
    Notification, Participant, PaymentAudit, PointCredit, RedeemRecord, Resource, ResourceKind,
    Tier, Transaction, User,
};

type ResourceKey = (ResourceKind, String);
type ParticipantKey = (ResourceKind, String, Uuid);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    resources: HashMap<ResourceKey, Resource>,
    participants: HashMap<ParticipantKey, Participant>,
    transactions: HashMap<String, Transaction>,
    payment_audits: Vec<PaymentAudit>,
    point_credits: Vec<PointCredit>,
    redeem_records: Vec<RedeemRecord>,
    notifications: Vec<Notification>,
    tiers: Vec<Tier>,
}

impl MemoryState {
    fn used_slots(&self, kind: ResourceKind, resource_code: &str) -> i64 {
        self.participants
            .values()
            .filter(|p| p.kind == kind && p.resource_code == resource_code && p.status.holds_slot())
            .count() as i64
    }

    fn exists_invoice_code(&self, invoice_code: &str) -> bool {
        self.redeem_records
            .iter()
            .any(|r| r.invoice_code == invoice_code)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn put_resource(&self, resource: Resource) {
        let key = (resource.kind, resource.code.clone());
        self.state.lock().await.resources.insert(key, resource);
    }

    pub async fn put_participant(&self, participant: Participant) {
        let key = (
            participant.kind,
            participant.resource_code.clone(),
            participant.user_id,
        );
        self.state.lock().await.participants.insert(key, participant);
    }

    pub async fn put_transaction(&self, transaction: Transaction) {
        self.state
            .lock()
            .await
            .transactions
            .insert(transaction.code.clone(), transaction);
    }

    pub async fn put_tier(&self, tier: Tier) {
        self.state.lock().await.tiers.push(tier);
    }

    pub async fn participants(&self) -> Vec<Participant> {
        self.state.lock().await.participants.values().cloned().collect()
    }

    pub async fn point_credits(&self) -> Vec<PointCredit> {
        self.state.lock().await.point_credits.clone()
    }

    pub async fn payment_audits(&self) -> Vec<PaymentAudit> {
        self.state.lock().await.payment_audits.clone()
    }

    pub async fn redeem_records(&self) -> Vec<RedeemRecord> {
        self.state.lock().await.redeem_records.clone()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().await.transactions.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn find_resource_by_code(
        &self,
        kind: ResourceKind,
        code: &str,
    ) -> StoreResult<Option<Resource>> {
        let state = self.state.lock().await;
        Ok(state.resources.get(&(kind, code.to_string())).cloned())
    }

    async fn find_participant(
        &self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .get(&(kind, resource_code.to_string(), user_id))
            .cloned())
    }

    async fn count_used_slots(&self, kind: ResourceKind, resource_code: &str) -> StoreResult<i64> {
        Ok(self.state.lock().await.used_slots(kind, resource_code))
    }

    async fn find_transaction(&self, code: &str) -> StoreResult<Option<Transaction>> {
        Ok(self.state.lock().await.transactions.get(code).cloned())
    }

    async fn exists_invoice_code(&self, invoice_code: &str) -> StoreResult<bool> {
        Ok(self.state.lock().await.exists_invoice_code(invoice_code))
    }

    async fn total_points(&self, user_id: Uuid) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .point_credits
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.point)
            .sum())
    }

    async fn list_tiers(&self) -> StoreResult<Vec<Tier>> {
        Ok(self.state.lock().await.tiers.clone())
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_resource(
        &mut self,
        kind: ResourceKind,
        code: &str,
    ) -> StoreResult<Option<Resource>> {
        Ok(self.staged.resources.get(&(kind, code.to_string())).cloned())
    }

    async fn update_resource(&mut self, resource: &Resource) -> StoreResult<()> {
        let key = (resource.kind, resource.code.clone());
        self.staged.resources.insert(key, resource.clone());
        Ok(())
    }

    async fn delete_resource(&mut self, kind: ResourceKind, code: &str) -> StoreResult<()> {
        self.staged.resources.remove(&(kind, code.to_string()));
        self.staged
            .participants
            .retain(|(k, c, _), _| !(*k == kind && c == code));
        Ok(())
    }

    async fn count_used_slots(
        &mut self,
        kind: ResourceKind,
        resource_code: &str,
    ) -> StoreResult<i64> {
        Ok(self.staged.used_slots(kind, resource_code))
    }

    async fn find_participant(
        &mut self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>> {
        Ok(self
            .staged
            .participants
            .get(&(kind, resource_code.to_string(), user_id))
            .cloned())
    }

    async fn upsert_participant(&mut self, participant: &Participant) -> StoreResult<()> {
        let key = (
            participant.kind,
            participant.resource_code.clone(),
            participant.user_id,
        );
        self.staged.participants.insert(key, participant.clone());
        Ok(())
    }

    async fn find_transaction(&mut self, code: &str) -> StoreResult<Option<Transaction>> {
        Ok(self.staged.transactions.get(code).cloned())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        if self.staged.transactions.contains_key(&transaction.code) {
            return Err(StoreError::Duplicate(format!(
                "transaction {}",
                transaction.code
            )));
        }
        self.staged
            .transactions
            .insert(transaction.code.clone(), transaction.clone());
        Ok(())
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        self.staged
            .transactions
            .insert(transaction.code.clone(), transaction.clone());
        Ok(())
    }

    async fn append_payment_audit(&mut self, audit: &PaymentAudit) -> StoreResult<()> {
        self.staged.payment_audits.push(audit.clone());
        Ok(())
    }

    async fn insert_point_credit(&mut self, credit: &PointCredit) -> StoreResult<()> {
        self.staged.point_credits.push(credit.clone());
        Ok(())
    }

    async fn lock_invoice_code(&mut self, _invoice_code: &str) -> StoreResult<()> {
        // The state lock is already exclusive.
        Ok(())
    }

    async fn exists_invoice_code(&mut self, invoice_code: &str) -> StoreResult<bool> {
        Ok(self.staged.exists_invoice_code(invoice_code))
    }

    async fn insert_redeem_record(&mut self, record: &RedeemRecord) -> StoreResult<()> {
        self.staged.redeem_records.push(record.clone());
        Ok(())
    }

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        self.staged.notifications.push(notification.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
