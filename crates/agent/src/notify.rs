//! Telegram notifications for approvals left waiting in the terminal.

use async_trait::async_trait;
use bonza_config::TelegramConfig;
use bonza_core::util::truncate_chars;
use tracing::{debug, warn};

use crate::approval::ApprovalNotifier;

const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram rejected the message for chat {chat_id}: status {status}")]
    Rejected { chat_id: i64, status: u16 },

    #[error("{} of {total} chats were not notified: {}", failures.len(), summarize(failures))]
    Incomplete {
        total: usize,
        failures: Vec<(i64, NotifyError)>,
    },
}

fn summarize(failures: &[(i64, NotifyError)]) -> String {
    failures
        .iter()
        .map(|(chat_id, e)| format!("{chat_id}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Sends a pending-approval message to every configured chat.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_ids: Vec<i64>,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_ids: Vec<i64>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: bot_token.into(),
            chat_ids,
            api_base: TELEGRAM_API.to_string(),
        }
    }

    /// `None` unless both a bot token and at least one chat id are set.
    pub fn from_config(config: &TelegramConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        let token = config.bot_token.clone()?;
        Some(Self::new(token, config.chat_ids.clone()))
    }

    /// Point at a different Bot API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }

    async fn send(&self, url: &str, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected {
                chat_id,
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// The Markdown text sent for a pending approval.
pub fn pending_message(tool_name: &str, command: &str) -> String {
    format!(
        "⚠️ *Bonza Approval Pending*\n\nTool: `{tool_name}`\nCommand: `{}`\n\nWaiting for your approval in the terminal...",
        truncate_chars(command, 200)
    )
}

#[async_trait]
impl ApprovalNotifier for TelegramNotifier {
    /// Sends to every chat even when some fail; failures are reported
    /// together afterwards.
    async fn notify_pending(&self, tool_name: &str, command: &str) -> Result<(), NotifyError> {
        let text = pending_message(tool_name, command);
        let url = self.endpoint();

        let mut failures = Vec::new();
        for &chat_id in &self.chat_ids {
            match self.send(&url, chat_id, &text).await {
                Ok(()) => debug!(chat_id, "Approval notification sent"),
                Err(e) => {
                    warn!(chat_id, error = %e, "Approval notification failed");
                    failures.push((chat_id, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifyError::Incomplete {
                total: self.chat_ids.len(),
                failures,
            })
        }
    }
}
