use crate::config::NotificationConfig;
use crate::models::User;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationEventType {
    #[serde(rename = "TICKET_PURCHASED")]
    TicketPurchased,
    #[serde(rename = "TICKET_CANCELLED")]
    TicketCancelled,
    #[serde(rename = "TICKET_VALIDATED")]
    TicketValidated,
    #[serde(rename = "TOURNAMENT_START")]
    TournamentStart,
    #[serde(rename = "TOURNAMENT_END")]
    TournamentEnd,
    #[serde(rename = "TOURNAMENT_UPDATED")]
    TournamentUpdated,
    #[serde(rename = "TOURNAMENT_REMINDER")]
    TournamentReminder,
    #[serde(rename = "USER_REGISTERED")]
    UserRegistered,
    #[serde(rename = "USER_LOGIN")]
    UserLogin,
    #[serde(rename = "SYSTEM_ALERT")]
    SystemAlert,
}

impl NotificationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEventType::TicketPurchased => "TICKET_PURCHASED",
            NotificationEventType::TicketCancelled => "TICKET_CANCELLED",
            NotificationEventType::TicketValidated => "TICKET_VALIDATED",
            NotificationEventType::TournamentStart => "TOURNAMENT_START",
            NotificationEventType::TournamentEnd => "TOURNAMENT_END",
            NotificationEventType::TournamentUpdated => "TOURNAMENT_UPDATED",
            NotificationEventType::TournamentReminder => "TOURNAMENT_REMINDER",
            NotificationEventType::UserRegistered => "USER_REGISTERED",
            NotificationEventType::UserLogin => "USER_LOGIN",
            NotificationEventType::SystemAlert => "SYSTEM_ALERT",
        }
    }
}

impl std::fmt::Display for NotificationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通知分发服务。调用方视角为 fire-and-forget: 分发在后台任务中执行,
/// 任何失败只记录日志, 不向业务调用方传播。
#[derive(Clone)]
pub struct NotificationService {
    client: Client,
    config: NotificationConfig,
}

impl NotificationService {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn notify(
        &self,
        user: &User,
        event_type: NotificationEventType,
        message: &str,
        data: serde_json::Value,
    ) {
        log::info!(
            "Notifying user {} ({}): {}",
            user.id,
            user.username,
            event_type
        );

        let Some(webhook_url) = self.config.webhook_url.clone() else {
            return;
        };

        let payload = json!({
            "user_id": user.id,
            "username": user.username,
            "event_type": event_type,
            "message": message,
            "data": data,
            "timestamp": Utc::now(),
        });

        let client = self.client.clone();
        let user_id = user.id;
        tokio::spawn(async move {
            match client.post(&webhook_url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    log::error!(
                        "Notification webhook returned {} for user {}",
                        response.status(),
                        user_id
                    );
                }
                Err(e) => {
                    log::error!("Notification delivery failed for user {user_id}: {e}");
                }
            }
        });
    }
}
