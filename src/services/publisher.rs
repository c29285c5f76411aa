//! Post-commit side effects: badge-check events and user notifications.
//!
//! Services hand events to an [`EventPublisher`] only after their unit of
//! work has committed. The publisher never blocks and never fails the
//! caller; an [`OutboundWorker`] drains the channel and delivers. Delivery
//! failures are logged and dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clients::{Broker, Notifier, PushMessage};
use crate::models::Notification;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTrigger {
    /// A booking changed state.
    Booking,
    /// The user's lifetime spend grew.
    TotalSpend,
    Winner,
}

/// Asks the badge consumer to re-evaluate one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BadgeCheck {
    pub user_id: Uuid,
    pub trigger: BadgeTrigger,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub receiver: Uuid,
    pub category: String,
    pub title: String,
    pub body: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    BadgeCheck(BadgeCheck),
    Notification(NotificationDraft),
}

#[derive(Clone)]
pub struct EventPublisher {
    sender: mpsc::UnboundedSender<OutboundEvent>,
}

impl EventPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn publish(&self, event: OutboundEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!(event = ?e.0, "Outbound worker gone, event dropped");
        }
    }

    pub fn badge_check(&self, user_id: Uuid, trigger: BadgeTrigger, reference: &str) {
        self.publish(OutboundEvent::BadgeCheck(BadgeCheck {
            user_id,
            trigger,
            reference: reference.to_string(),
            occurred_at: Utc::now(),
        }));
    }

    pub fn notify(&self, draft: NotificationDraft) {
        self.publish(OutboundEvent::Notification(draft));
    }
}

/// Broker topic names for badge checks.
#[derive(Debug, Clone)]
pub struct BadgeTopics {
    /// Per-user topic is `<prefix>.<user_id>`.
    pub prefix: String,
    /// Topic for total-spend checks.
    pub invoice: String,
}

impl BadgeTopics {
    pub fn topic_for(&self, check: &BadgeCheck) -> String {
        match check.trigger {
            BadgeTrigger::TotalSpend => self.invoice.clone(),
            BadgeTrigger::Booking | BadgeTrigger::Winner => {
                format!("{}.{}", self.prefix, check.user_id)
            }
        }
    }
}

pub struct OutboundWorker {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    notifier: Arc<dyn Notifier>,
    topics: BadgeTopics,
}

impl OutboundWorker {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        notifier: Arc<dyn Notifier>,
        topics: BadgeTopics,
    ) -> Self {
        Self {
            store,
            broker,
            notifier,
            topics,
        }
    }

    /// Runs until every publisher handle has been dropped.
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<OutboundEvent>) {
        info!("Outbound worker started");
        while let Some(event) = receiver.recv().await {
            self.handle(event).await;
        }
        info!("Outbound worker stopped");
    }

    pub async fn handle(&self, event: OutboundEvent) {
        match event {
            OutboundEvent::BadgeCheck(check) => self.deliver_badge_check(check).await,
            OutboundEvent::Notification(draft) => self.deliver_notification(draft).await,
        }
    }

    async fn deliver_badge_check(&self, check: BadgeCheck) {
        let topic = self.topics.topic_for(&check);
        let payload = match serde_json::to_string(&check) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, user_id = %check.user_id, "Could not encode badge check");
                return;
            }
        };

        match self.broker.publish(&topic, &payload).await {
            Ok(()) => debug!(topic = %topic, user_id = %check.user_id, "Badge check published"),
            Err(e) => warn!(
                error = %e,
                topic = %topic,
                user_id = %check.user_id,
                "Badge check lost"
            ),
        }
    }

    async fn deliver_notification(&self, draft: NotificationDraft) {
        let record = Notification {
            code: format!("NTF-{}", Uuid::new_v4().simple()),
            receiver: draft.receiver,
            notification_type: draft.category.clone(),
            title: draft.title.clone(),
            description: draft.body.clone(),
            image: draft.image.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.persist(&record).await {
            warn!(error = %e, receiver = %draft.receiver, "Notification record not saved");
        }

        let player_token = match self.store.find_user(draft.receiver).await {
            Ok(Some(user)) => user.player_token,
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, receiver = %draft.receiver, "Could not load push token");
                None
            }
        };

        let Some(player_token) = player_token else {
            debug!(receiver = %draft.receiver, "No push token, notification stored only");
            return;
        };

        let message = PushMessage {
            player_token,
            title: draft.title,
            body: draft.body,
            category: draft.category,
        };
        if let Err(e) = self.notifier.notify(message).await {
            warn!(error = %e, receiver = %draft.receiver, "Push delivery failed");
        }
    }

    async fn persist(&self, record: &Notification) -> Result<(), crate::store::StoreError> {
        let mut uow = self.store.begin().await?;
        uow.insert_notification(record).await?;
        uow.commit().await
    }
}
