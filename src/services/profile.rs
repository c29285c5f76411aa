use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::models::tier::tier_for;
use crate::models::Tier;
use crate::store::Store;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub total_points: i64,
    pub tier: Option<Tier>,
}

pub struct ProfileService {
    store: Arc<dyn Store>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Balance is the sum of the point ledger; the tier is derived from it.
    pub async fn get_profile(&self, user_id: Uuid) -> Result<Profile, AppError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User '{}' was not found", user_id)))?;

        let total_points = self.store.total_points(user_id).await?;
        let tiers = self.store.list_tiers().await?;
        let tier = tier_for(total_points, &tiers).cloned();

        Ok(Profile {
            user_id: user.id,
            name: user.name,
            email: user.email,
            total_points,
            tier,
        })
    }
}
