use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted copy of every notification, written whether or not push
/// delivery succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub code: String,
    pub receiver: Uuid,
    pub notification_type: String,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}
