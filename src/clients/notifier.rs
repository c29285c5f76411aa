use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("push delivery failed: {0}")]
    Transport(String),

    #[error("push provider rejected message ({status})")]
    Rejected { status: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub player_token: String,
    pub title: String,
    pub body: String,
    pub category: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: PushMessage) -> Result<(), NotifierError>;
}

#[derive(Serialize)]
struct LocalizedText<'a> {
    en: &'a str,
}

#[derive(Serialize)]
struct PushData<'a> {
    category: &'a str,
}

#[derive(Serialize)]
struct PushBody<'a> {
    app_id: &'a str,
    include_player_ids: [&'a str; 1],
    headings: LocalizedText<'a>,
    contents: LocalizedText<'a>,
    data: PushData<'a>,
}

/// OneSignal REST push sender.
#[derive(Clone)]
pub struct OneSignalNotifier {
    http: reqwest::Client,
    api_url: String,
    app_id: String,
    api_key: String,
}

impl OneSignalNotifier {
    pub fn new(
        http: reqwest::Client,
        api_url: impl Into<String>,
        app_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            app_id: app_id.into(),
            api_key: api_key.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.app_id.is_empty() && !self.api_key.is_empty()
    }
}

#[async_trait]
impl Notifier for OneSignalNotifier {
    async fn notify(&self, message: PushMessage) -> Result<(), NotifierError> {
        if !self.is_configured() {
            debug!(category = %message.category, "Push disabled, skipping delivery");
            return Ok(());
        }

        let body = PushBody {
            app_id: &self.app_id,
            include_player_ids: [&message.player_token],
            headings: LocalizedText { en: &message.title },
            contents: LocalizedText { en: &message.body },
            data: PushData {
                category: &message.category,
            },
        };

        let response = self
            .http
            .post(&self.api_url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Basic {}", self.api_key),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifierError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
