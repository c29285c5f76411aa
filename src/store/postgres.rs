//! Postgres store over sqlx. A unit of work is a sqlx transaction; rows
//! read through it are taken `FOR UPDATE` so a check and the write that
//! depends on it cannot be split by a concurrent request.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, UnitOfWork};
use crate::models::{
    Notification, Participant, PaymentAudit, PointCredit, RedeemRecord, Resource, ResourceKind,
    Tier, Transaction, User,
};

const RESOURCE_COLUMNS: &str = "kind, code, name, status, max_participant, price, \
     participation_point, created_at, updated_at";

const PARTICIPANT_COLUMNS: &str = "id, kind, resource_code, user_id, status, position, \
     status_winner, reward_point, participation_point, transaction_code, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "code, user_id, data_source, source_code, price, status, \
     invoice_id, invoice_url, expires_at, payment_method, raw_payload, created_at, updated_at";

const USED_SLOTS_SQL: &str = "SELECT COUNT(*) FROM participants \
     WHERE kind = $1 AND resource_code = $2 AND status IN ('pending', 'active')";

fn parse_column<T>(row: &PgRow, column: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(StoreError::CorruptRow)
}

fn resource_from_row(row: &PgRow) -> StoreResult<Resource> {
    Ok(Resource {
        kind: parse_column(row, "kind")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        status: parse_column(row, "status")?,
        max_participant: row.try_get("max_participant")?,
        price: row.try_get("price")?,
        participation_point: row.try_get("participation_point")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn participant_from_row(row: &PgRow) -> StoreResult<Participant> {
    Ok(Participant {
        id: row.try_get("id")?,
        kind: parse_column(row, "kind")?,
        resource_code: row.try_get("resource_code")?,
        user_id: row.try_get("user_id")?,
        status: parse_column(row, "status")?,
        position: row.try_get("position")?,
        status_winner: row.try_get("status_winner")?,
        reward_point: row.try_get("reward_point")?,
        participation_point: row.try_get("participation_point")?,
        transaction_code: row.try_get("transaction_code")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> StoreResult<Transaction> {
    Ok(Transaction {
        code: row.try_get("code")?,
        user_id: row.try_get("user_id")?,
        data_source: parse_column(row, "data_source")?,
        source_code: row.try_get("source_code")?,
        price: row.try_get("price")?,
        status: parse_column(row, "status")?,
        invoice_id: row.try_get("invoice_id")?,
        invoice_url: row.try_get("invoice_url")?,
        expires_at: row.try_get("expires_at")?,
        payment_method: row.try_get("payment_method")?,
        raw_payload: row.try_get("raw_payload")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, player_token, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_resource_by_code(
        &self,
        kind: ResourceKind,
        code: &str,
    ) -> StoreResult<Option<Resource>> {
        let sql = format!(
            "SELECT {} FROM resources WHERE kind = $1 AND code = $2",
            RESOURCE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn find_participant(
        &self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>> {
        let sql = format!(
            "SELECT {} FROM participants WHERE kind = $1 AND resource_code = $2 AND user_id = $3",
            PARTICIPANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(resource_code)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(participant_from_row).transpose()
    }

    async fn count_used_slots(&self, kind: ResourceKind, resource_code: &str) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(USED_SLOTS_SQL)
            .bind(kind.as_str())
            .bind(resource_code)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn find_transaction(&self, code: &str) -> StoreResult<Option<Transaction>> {
        let sql = format!("SELECT {} FROM transactions WHERE code = $1", TRANSACTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn exists_invoice_code(&self, invoice_code: &str) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM redeem_records WHERE invoice_code = $1)")
                .bind(invoice_code)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn total_points(&self, user_id: Uuid) -> StoreResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(point), 0)::BIGINT FROM point_credits WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn list_tiers(&self) -> StoreResult<Vec<Tier>> {
        let tiers = sqlx::query_as::<_, Tier>(
            "SELECT id, name, min_point, max_point FROM tiers ORDER BY min_point",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tiers)
    }
}

pub struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_resource(
        &mut self,
        kind: ResourceKind,
        code: &str,
    ) -> StoreResult<Option<Resource>> {
        let sql = format!(
            "SELECT {} FROM resources WHERE kind = $1 AND code = $2 FOR UPDATE",
            RESOURCE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn update_resource(&mut self, resource: &Resource) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE resources
            SET name = $3, status = $4, max_participant = $5, price = $6,
                participation_point = $7, updated_at = NOW()
            WHERE kind = $1 AND code = $2
            "#,
        )
        .bind(resource.kind.as_str())
        .bind(&resource.code)
        .bind(&resource.name)
        .bind(resource.status.as_str())
        .bind(resource.max_participant)
        .bind(resource.price)
        .bind(resource.participation_point)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_resource(&mut self, kind: ResourceKind, code: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM participants WHERE kind = $1 AND resource_code = $2")
            .bind(kind.as_str())
            .bind(code)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM resources WHERE kind = $1 AND code = $2")
            .bind(kind.as_str())
            .bind(code)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn count_used_slots(
        &mut self,
        kind: ResourceKind,
        resource_code: &str,
    ) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(USED_SLOTS_SQL)
            .bind(kind.as_str())
            .bind(resource_code)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn find_participant(
        &mut self,
        kind: ResourceKind,
        resource_code: &str,
        user_id: Uuid,
    ) -> StoreResult<Option<Participant>> {
        let sql = format!(
            "SELECT {} FROM participants \
             WHERE kind = $1 AND resource_code = $2 AND user_id = $3 FOR UPDATE",
            PARTICIPANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(resource_code)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(participant_from_row).transpose()
    }

    async fn upsert_participant(&mut self, participant: &Participant) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO participants (
                id, kind, resource_code, user_id, status, position, status_winner,
                reward_point, participation_point, transaction_code, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            ON CONFLICT (kind, resource_code, user_id) DO UPDATE
            SET status = EXCLUDED.status,
                position = EXCLUDED.position,
                status_winner = EXCLUDED.status_winner,
                reward_point = EXCLUDED.reward_point,
                participation_point = EXCLUDED.participation_point,
                transaction_code = EXCLUDED.transaction_code,
                updated_at = NOW()
            "#,
        )
        .bind(participant.id)
        .bind(participant.kind.as_str())
        .bind(&participant.resource_code)
        .bind(participant.user_id)
        .bind(participant.status.as_str())
        .bind(participant.position)
        .bind(participant.status_winner)
        .bind(participant.reward_point)
        .bind(participant.participation_point)
        .bind(&participant.transaction_code)
        .bind(participant.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_transaction(&mut self, code: &str) -> StoreResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE code = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO transactions ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            TRANSACTION_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&transaction.code)
            .bind(transaction.user_id)
            .bind(transaction.data_source.as_str())
            .bind(&transaction.source_code)
            .bind(transaction.price)
            .bind(transaction.status.as_str())
            .bind(&transaction.invoice_id)
            .bind(&transaction.invoice_url)
            .bind(transaction.expires_at)
            .bind(&transaction.payment_method)
            .bind(&transaction.raw_payload)
            .bind(transaction.created_at)
            .bind(transaction.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, payment_method = $3, raw_payload = $4, updated_at = NOW()
            WHERE code = $1
            "#,
        )
        .bind(&transaction.code)
        .bind(transaction.status.as_str())
        .bind(&transaction.payment_method)
        .bind(&transaction.raw_payload)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_payment_audit(&mut self, audit: &PaymentAudit) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_audits (id, transaction_code, status, payment_method, received_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(audit.id)
        .bind(&audit.transaction_code)
        .bind(audit.status.as_str())
        .bind(&audit.payment_method)
        .bind(audit.received_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_point_credit(&mut self, credit: &PointCredit) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO point_credits (id, user_id, source, reference, point, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(credit.id)
        .bind(credit.user_id)
        .bind(credit.source.as_str())
        .bind(&credit.reference)
        .bind(credit.point)
        .bind(credit.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_invoice_code(&mut self, invoice_code: &str) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(invoice_code)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn exists_invoice_code(&mut self, invoice_code: &str) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM redeem_records WHERE invoice_code = $1)")
                .bind(invoice_code)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn insert_redeem_record(&mut self, record: &RedeemRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO redeem_records (
                id, user_id, invoice_code, amount, point, invoice_snapshot, platform, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&record.id)
        .bind(record.user_id)
        .bind(&record.invoice_code)
        .bind(record.amount)
        .bind(record.point)
        .bind(&record.invoice_snapshot)
        .bind(record.platform.as_str())
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                code, receiver, notification_type, title, description, image, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&notification.code)
        .bind(notification.receiver)
        .bind(&notification.notification_type)
        .bind(&notification.title)
        .bind(&notification.description)
        .bind(&notification.image)
        .bind(notification.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
