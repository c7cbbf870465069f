//! Deep-link registration poller
//!
//! Long-polls `getUpdates` and redeems `/start <token>` messages: the chat
//! that sent the token becomes the delivery address of the token's owner.
//!
//! The loop runs until its [`CancellationToken`] fires. Transport errors are
//! logged and retried after a back-off; nothing here is fatal.

use meteo_core::traits::{AccountStore, Notifier};
use meteo_core::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ApiResponse, TelegramNotifier, transport_error};

/// Server-side long-poll timeout
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(20);

/// Pause after a failed poll
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Pause between successful polls
const IDLE_PAUSE: Duration = Duration::from_millis(500);

const CONFIRMATION_TEXT: &str =
    "✅ Registration complete! You will receive weather notifications in this chat.";
const FAILURE_TEXT: &str = "Registration failed. Please try again later.";

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Token carried by a `/start <token>` message
fn start_token(text: &str) -> Option<&str> {
    let mut parts = text.split_whitespace();
    if !parts.next()?.starts_with("/start") {
        return None;
    }
    parts.next()
}

/// getUpdates loop linking chats to accounts
pub struct LinkPoller {
    notifier: Arc<TelegramNotifier>,
    accounts: Arc<dyn AccountStore>,
    poll_timeout: Duration,
    backoff: Duration,
}

impl LinkPoller {
    pub fn new(notifier: Arc<TelegramNotifier>, accounts: Arc<dyn AccountStore>) -> Self {
        Self {
            notifier,
            accounts,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Override the long-poll timeout and the error back-off
    pub fn with_timing(mut self, poll_timeout: Duration, backoff: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self.backoff = backoff;
        self
    }

    /// Poll until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        if !self.notifier.is_configured() {
            info!("Telegram bot token not set, registration poller disabled");
            return;
        }

        info!("Telegram registration poller started");
        let mut offset = 0;

        loop {
            let pause = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.poll_once(offset) => match result {
                    Ok(next) => {
                        offset = next;
                        IDLE_PAUSE
                    }
                    Err(e) => {
                        warn!("getUpdates failed: {}", e);
                        self.backoff
                    }
                },
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Telegram registration poller stopped");
    }

    /// Fetch one batch of updates and handle it, returning the next offset
    pub async fn poll_once(&self, offset: i64) -> Result<i64> {
        let url = self.notifier.method_url("getUpdates")?;

        let response = self
            .notifier
            .client()
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout.as_secs().to_string()),
            ])
            // Leave room for the server to hold the request for the full timeout
            .timeout(self.poll_timeout + Duration::from_secs(10))
            .send()
            .await
            .map_err(transport_error)?;

        let body: ApiResponse<Vec<Update>> = response.json().await.map_err(transport_error)?;
        if !body.ok {
            return Err(Error::notifier(format!(
                "getUpdates rejected: {}",
                body.description
            )));
        }

        let mut next = offset;
        for update in body.result.unwrap_or_default() {
            next = next.max(update.update_id + 1);
            if let Some(message) = update.message {
                self.handle_message(message).await;
            }
        }

        Ok(next)
    }

    async fn handle_message(&self, message: Message) {
        let Some(token) = start_token(&message.text) else {
            debug!("Ignoring message without start token");
            return;
        };
        let chat_id = message.chat.id.to_string();

        match self.accounts.redeem_link_token(token, &chat_id).await {
            Ok(Some(username)) => {
                info!("Linked Telegram chat {} to user {}", chat_id, username);
                if let Err(e) = self.notifier.send_text(&chat_id, CONFIRMATION_TEXT).await {
                    warn!("Failed to send confirmation to {}: {}", chat_id, e);
                }
            }
            Ok(None) => {
                info!("Link token not found or already used (chat {})", chat_id);
            }
            Err(e) => {
                warn!("Failed to link chat {}: {}", chat_id, e);
                if let Err(e) = self.notifier.send_text(&chat_id, FAILURE_TEXT).await {
                    debug!("Failed to send apology to {}: {}", chat_id, e);
                }
            }
        }
    }
}

impl std::fmt::Debug for LinkPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkPoller")
            .field("notifier", &self.notifier)
            .field("poll_timeout", &self.poll_timeout)
            .field("backoff", &self.backoff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meteo_core::accounts::MemoryAccountStore;
    use meteo_core::traits::{RecipientSource, User};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123:secret";

    async fn setup(server: &MockServer) -> (LinkPoller, Arc<MemoryAccountStore>) {
        let accounts = Arc::new(MemoryAccountStore::with_hash_cost(4));
        accounts.upsert_user(&User::new("anna")).await.unwrap();

        let notifier = Arc::new(
            TelegramNotifier::with_api_base(TOKEN, accounts.clone(), server.uri()).unwrap(),
        );
        let poller = LinkPoller::new(notifier, accounts.clone())
            .with_timing(Duration::from_secs(1), Duration::from_millis(10));
        (poller, accounts)
    }

    fn updates(items: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": items}))
    }

    #[test]
    fn test_start_token_parsing() {
        assert_eq!(start_token("/start abc"), Some("abc"));
        assert_eq!(start_token("  /start   abc  extra"), Some("abc"));
        assert_eq!(start_token("/start@meteo_bot abc"), Some("abc"));
        assert_eq!(start_token("/start"), None);
        assert_eq!(start_token("hello abc"), None);
        assert_eq!(start_token(""), None);
    }

    #[tokio::test]
    async fn test_start_message_links_chat() {
        let server = MockServer::start().await;
        let (poller, accounts) = setup(&server).await;
        let token = accounts.issue_link_token("anna").await.unwrap();

        Mock::given(method("GET"))
            .and(path(format!("/bot{}/getUpdates", TOKEN)))
            .and(query_param("offset", "0"))
            .respond_with(updates(json!([
                {"update_id": 41, "message": {"chat": {"id": 999}, "text": "hello"}},
                {"update_id": 42, "message": {"chat": {"id": 777}, "text": format!("/start {}", token)}}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{}/sendMessage", TOKEN)))
            .and(body_partial_json(json!({"chat_id": "777"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let next = poller.poll_once(0).await.unwrap();
        assert_eq!(next, 43);

        let user = accounts.get_user("anna").await.unwrap().unwrap();
        assert!(user.notify);
        assert_eq!(user.telegram_chat_id, "777");
        assert_eq!(accounts.eligible_recipients().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_token_is_ignored() {
        let server = MockServer::start().await;
        let (poller, accounts) = setup(&server).await;

        Mock::given(method("GET"))
            .and(path(format!("/bot{}/getUpdates", TOKEN)))
            .respond_with(updates(json!([
                {"update_id": 7, "message": {"chat": {"id": 1}, "text": "/start nope"}}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(poller.poll_once(5).await.unwrap(), 8);
        assert!(accounts.eligible_recipients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_poll_is_an_error() {
        let server = MockServer::start().await;
        let (poller, _accounts) = setup(&server).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "ok": false,
                "description": "Conflict: terminated by other getUpdates request"
            })))
            .mount(&server)
            .await;

        let result = poller.poll_once(0).await;
        assert!(matches!(result, Err(Error::Notifier(ref m)) if m.contains("Conflict")));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let server = MockServer::start().await;
        let (poller, _accounts) = setup(&server).await;

        Mock::given(method("GET"))
            .respond_with(updates(json!([])))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(result.is_ok(), "Poller should stop within 5 seconds");
    }
}
