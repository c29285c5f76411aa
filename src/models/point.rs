use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointSource {
    Payment,
    Participation,
    Redeem,
    Winner,
}

impl PointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointSource::Payment => "payment",
            PointSource::Participation => "participation",
            PointSource::Redeem => "redeem",
            PointSource::Winner => "winner",
        }
    }
}

impl FromStr for PointSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" => Ok(PointSource::Payment),
            "participation" => Ok(PointSource::Participation),
            "redeem" => Ok(PointSource::Redeem),
            "winner" => Ok(PointSource::Winner),
            other => Err(format!("unknown point source '{}'", other)),
        }
    }
}

/// One entry in the append-only point ledger. A user's balance is the sum
/// of their credits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCredit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: PointSource,
    /// Transaction code, invoice code or participant id the award belongs to.
    pub reference: String,
    pub point: i64,
    pub created_at: DateTime<Utc>,
}

impl PointCredit {
    pub fn new(user_id: Uuid, source: PointSource, reference: &str, point: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            source,
            reference: reference.to_string(),
            point,
            created_at: Utc::now(),
        }
    }
}
