use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tier {
    pub id: Uuid,
    pub name: String,
    pub min_point: i64,
    /// `None` for the open-ended top tier.
    pub max_point: Option<i64>,
}

impl Tier {
    pub fn contains(&self, points: i64) -> bool {
        points >= self.min_point && self.max_point.map_or(true, |max| points <= max)
    }
}

/// Picks the tier band containing `points`. When bands overlap the one with
/// the highest floor wins.
pub fn tier_for(points: i64, tiers: &[Tier]) -> Option<&Tier> {
    tiers
        .iter()
        .filter(|tier| tier.contains(points))
        .max_by_key(|tier| tier.min_point)
}
