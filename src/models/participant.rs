use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Pending,
    Active,
    Cancel,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Pending => "pending",
            ParticipantStatus::Active => "active",
            ParticipantStatus::Cancel => "cancel",
        }
    }

    /// Pending and active rows hold a slot on the resource.
    pub fn holds_slot(&self) -> bool {
        matches!(self, ParticipantStatus::Pending | ParticipantStatus::Active)
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ParticipantStatus::Pending),
            "active" => Ok(ParticipantStatus::Active),
            "cancel" => Ok(ParticipantStatus::Cancel),
            other => Err(format!("unknown participant status '{}'", other)),
        }
    }
}

/// One row per (resource, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub kind: ResourceKind,
    pub resource_code: String,
    pub user_id: Uuid,
    pub status: ParticipantStatus,
    /// Finishing rank, 0 when unset.
    pub position: i32,
    pub status_winner: bool,
    pub reward_point: i64,
    pub participation_point: i64,
    pub transaction_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(kind: ResourceKind, resource_code: &str, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            resource_code: resource_code.to_string(),
            user_id,
            status: ParticipantStatus::Pending,
            position: 0,
            status_winner: false,
            reward_point: 0,
            participation_point: 0,
            transaction_code: None,
            created_at: now,
            updated_at: now,
        }
    }
}
