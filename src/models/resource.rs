use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which kind of bookable offering a resource is. Also used as the
/// data-source tag on transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Room,
    Tournament,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Room => "room",
            ResourceKind::Tournament => "tournament",
        }
    }

    /// Path segment used by the HTTP surface (`rooms`, `tournaments`).
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "rooms" => Some(ResourceKind::Room),
            "tournaments" => Some(ResourceKind::Tournament),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "room" => Ok(ResourceKind::Room),
            "tournament" => Ok(ResourceKind::Tournament),
            other => Err(format!("unknown resource kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Active,
    Inactive,
    Closed,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Active => "active",
            ResourceStatus::Inactive => "inactive",
            ResourceStatus::Closed => "closed",
        }
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ResourceStatus::Active),
            "inactive" => Ok(ResourceStatus::Inactive),
            "closed" => Ok(ResourceStatus::Closed),
            other => Err(format!("unknown resource status '{}'", other)),
        }
    }
}

/// A capacity-limited, time-boxed room or tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub code: String,
    pub name: String,
    pub status: ResourceStatus,
    pub max_participant: i32,
    pub price: Decimal,
    /// Bonus points granted on a paid booking, copied onto the participant
    /// when the invoice is opened.
    pub participation_point: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
