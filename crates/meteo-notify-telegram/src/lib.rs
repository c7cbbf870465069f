// # Telegram Notifier
//
// This crate delivers weather snapshots through the Telegram Bot API and
// links Telegram chats to user accounts.
//
// ## Components
//
// - `TelegramNotifier`: Notifier implementation (sendMessage, getMe)
// - `LinkPoller`: getUpdates long-poll loop redeeming `/start <token>`
//
// ## Security Requirements
//
// - The bot token is part of every request path; it NEVER appears in logs,
//   error messages or Debug output
// - Transport errors are stripped of their URL before being reported
//
// ## API Reference
//
// - Bot API: https://core.telegram.org/bots/api
// - sendMessage: POST `/bot<token>/sendMessage`
// - getMe: GET `/bot<token>/getMe`
// - getUpdates: GET `/bot<token>/getUpdates?offset=..&timeout=..`

pub mod poller;

pub use poller::LinkPoller;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use meteo_core::traits::{DeliveryFailure, DeliveryReport, Notifier, RecipientSource};
use meteo_core::weather::WeatherSnapshot;
use meteo_core::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Telegram Bot API base URL
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Timeout for sendMessage and getMe
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    #[serde(default)]
    pub(crate) ok: bool,
    pub(crate) result: Option<T>,
    #[serde(default)]
    pub(crate) description: String,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[serde(default)]
    username: String,
}

/// Render a snapshot as a Markdown message
///
/// `now` is the send time printed on the first line.
pub fn format_snapshot(snapshot: &WeatherSnapshot, now: DateTime<Local>) -> String {
    format!(
        "{}\n🌤️ *Weather {}*\n\n\
         🕐 {}\n\n\
         *Current conditions*\n\
         {}\n\
         🌡️ Temperature: {:.1}°C\n\
         💧 Humidity: {:.0}%\n\
         💨 Wind: {:.1} km/h\n\
         🌧️ Precipitation: {:.1} mm\n\n\
         *Today*\n\
         Max: {:.1}°C | Min: {:.1}°C",
        now.format("%d/%m/%Y %H:%M"),
        snapshot.place,
        snapshot.observed_at.format("%H:%M - %d/%m/%Y"),
        snapshot.current.condition,
        snapshot.current.temperature_c,
        snapshot.current.humidity_pct,
        snapshot.current.wind_kmh,
        snapshot.current.precipitation_mm,
        snapshot.today.max_c,
        snapshot.today.min_c,
    )
}

/// Telegram Bot API notifier
///
/// With an empty token the notifier stays constructible but every send
/// fails with a `Notifier` error.
pub struct TelegramNotifier {
    /// Bot token
    /// ⚠️ NEVER log this value
    token: String,
    api_base: String,
    client: reqwest::Client,
    recipients: Arc<dyn RecipientSource>,
}

// Custom Debug implementation that hides the bot token
impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl TelegramNotifier {
    /// Create a notifier against the public Bot API
    pub fn new(token: impl Into<String>, recipients: Arc<dyn RecipientSource>) -> Result<Self> {
        Self::with_api_base(token, recipients, DEFAULT_API_BASE)
    }

    /// Create a notifier against a custom API base URL
    pub fn with_api_base(
        token: impl Into<String>,
        recipients: Arc<dyn RecipientSource>,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            token: token.into().trim().to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
            recipients,
        })
    }

    /// Whether a bot token is set
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty()
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Full URL of a Bot API method
    pub(crate) fn method_url(&self, method: &str) -> Result<String> {
        if !self.is_configured() {
            return Err(Error::notifier("Telegram bot token not configured"));
        }
        Ok(format!("{}/bot{}/{}", self.api_base, self.token, method))
    }

    /// Send a message, optionally with Markdown formatting
    async fn send_message(&self, chat_id: &str, text: &str, markdown: bool) -> Result<()> {
        let url = self.method_url("sendMessage")?;

        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if markdown {
            payload["parse_mode"] = json!("Markdown");
        }

        let response = self
            .client
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::notifier(format!(
                "Telegram API status {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(())
    }

    /// The bot's username from getMe, if resolvable
    pub async fn bot_username(&self) -> Option<String> {
        let url = self.method_url("getMe").ok()?;

        let response = match self.client.get(&url).timeout(SEND_TIMEOUT).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("getMe failed: {}", e.without_url());
                return None;
            }
        };

        let body: ApiResponse<BotUser> = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("getMe returned an unreadable body: {}", e.without_url());
                return None;
            }
        };

        if !body.ok {
            tracing::debug!("getMe rejected: {}", body.description);
            return None;
        }

        body.result
            .map(|bot| bot.username)
            .filter(|username| !username.is_empty())
    }

    /// Deep link opening the bot with `token`, or the bare token when the
    /// bot username is unknown
    pub async fn deep_link(&self, token: &str) -> String {
        match self.bot_username().await {
            Some(bot) => format!("https://t.me/{}?start={}", bot, token),
            None => token.to_string(),
        }
    }
}

/// Convert a transport error without leaking the token-bearing URL
pub(crate) fn transport_error(e: reqwest::Error) -> Error {
    Error::notifier(format!("Telegram request failed: {}", e.without_url()))
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn broadcast(&self, snapshot: &WeatherSnapshot) -> Result<DeliveryReport> {
        if !self.is_configured() {
            return Err(Error::notifier("Telegram bot token not configured"));
        }

        let recipients = self.recipients.eligible_recipients().await?;
        let mut report = DeliveryReport::default();

        if recipients.is_empty() {
            tracing::info!("No users with notifications enabled and a linked chat");
            return Ok(report);
        }

        let text = format_snapshot(snapshot, Local::now());

        for recipient in recipients {
            match self.send_message(&recipient.address, &text, true).await {
                Ok(()) => {
                    report.sent += 1;
                    tracing::debug!(
                        "Notification sent to {} ({})",
                        recipient.username,
                        recipient.address
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to notify {} ({}): {}",
                        recipient.username,
                        recipient.address,
                        e
                    );
                    report.failures.push(DeliveryFailure {
                        address: recipient.address,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<()> {
        self.send_message(address, text, false).await
    }
}
