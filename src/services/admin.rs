//! Administrative actions that touch booking state: winners, status
//! changes and deletion.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    Participant, ParticipantStatus, PointCredit, PointSource, Resource, ResourceKind,
    ResourceStatus,
};
use crate::services::guard::check_modification;
use crate::services::publisher::{BadgeTrigger, EventPublisher, NotificationDraft};
use crate::store::{Store, UnitOfWork};
use crate::utils::error::AppError;

pub struct AdminService {
    store: Arc<dyn Store>,
    publisher: EventPublisher,
}

async fn locked_resource(
    uow: &mut dyn UnitOfWork,
    kind: ResourceKind,
    code: &str,
) -> Result<Resource, AppError> {
    uow.lock_resource(kind, code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} '{}' was not found", kind, code)))
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    /// Records a finishing rank and reward for a paid participant. Closed
    /// resources still accept results.
    pub async fn set_winner(
        &self,
        kind: ResourceKind,
        code: &str,
        user_id: Uuid,
        position: i32,
        reward_point: i64,
    ) -> Result<Participant, AppError> {
        if position < 1 {
            return Err(AppError::ValidationError("position must be at least 1".to_string()));
        }
        if reward_point < 0 {
            return Err(AppError::ValidationError(
                "reward_point cannot be negative".to_string(),
            ));
        }

        let mut uow = self.store.begin().await?;
        let resource = locked_resource(uow.as_mut(), kind, code).await?;

        let mut participant = uow
            .find_participant(kind, code, user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("User '{}' has not booked this {}", user_id, kind))
            })?;

        if participant.status != ParticipantStatus::Active {
            return Err(AppError::Conflict(format!(
                "Only paid participants can win this {}",
                kind
            )));
        }
        if participant.status_winner {
            return Err(AppError::Conflict(format!(
                "This participant is already a winner of this {}",
                kind
            )));
        }

        participant.position = position;
        participant.status_winner = true;
        participant.reward_point = reward_point;
        participant.updated_at = Utc::now();
        uow.upsert_participant(&participant).await?;

        if reward_point > 0 {
            uow.insert_point_credit(&PointCredit::new(
                user_id,
                PointSource::Winner,
                &participant.id.to_string(),
                reward_point,
            ))
            .await?;
        }
        uow.commit().await?;

        info!(
            resource_kind = %kind,
            resource_code = code,
            user_id = %user_id,
            position,
            reward_point,
            "Winner recorded"
        );

        self.publisher
            .badge_check(user_id, BadgeTrigger::Winner, &participant.id.to_string());
        self.publisher.notify(NotificationDraft {
            receiver: user_id,
            category: "winner".to_string(),
            title: "Congratulations!".to_string(),
            body: format!(
                "You finished #{} in {} and earned {} points.",
                position, resource.name, reward_point
            ),
            image: None,
        });

        Ok(participant)
    }

    pub async fn update_resource_status(
        &self,
        kind: ResourceKind,
        code: &str,
        status: &str,
    ) -> Result<Resource, AppError> {
        let status: ResourceStatus = status.parse().map_err(AppError::ValidationError)?;

        let mut uow = self.store.begin().await?;
        let mut resource = locked_resource(uow.as_mut(), kind, code).await?;
        check_modification(&resource)?;

        resource.status = status;
        resource.updated_at = Utc::now();
        uow.update_resource(&resource).await?;
        uow.commit().await?;

        info!(resource_kind = %kind, resource_code = code, status = status.as_str(), "Resource status changed");
        Ok(resource)
    }

    /// Never cascades: a resource anyone still holds a slot on stays.
    pub async fn delete_resource(&self, kind: ResourceKind, code: &str) -> Result<(), AppError> {
        let mut uow = self.store.begin().await?;
        let resource = locked_resource(uow.as_mut(), kind, code).await?;
        check_modification(&resource)?;

        let used_slots = uow.count_used_slots(kind, code).await?;
        if used_slots > 0 {
            return Err(AppError::Conflict(format!(
                "This {} still has {} participant(s) and cannot be deleted",
                kind, used_slots
            )));
        }

        uow.delete_resource(kind, code).await?;
        uow.commit().await?;

        info!(resource_kind = %kind, resource_code = code, "Resource deleted");
        Ok(())
    }
}
