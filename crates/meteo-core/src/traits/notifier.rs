// # Notifier Trait
//
// Defines the interface for delivering messages to subscribers.
//
// ## Implementations
//
// - Telegram: `meteo-notify-telegram` crate

use async_trait::async_trait;

use crate::error::Result;
use crate::weather::WeatherSnapshot;

/// One recipient that could not be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Delivery address (e.g., chat id)
    pub address: String,
    /// Why the send failed
    pub error: String,
}

/// Aggregated result of a broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Number of recipients that accepted the message
    pub sent: usize,
    /// Per-recipient failures
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    /// Total number of recipients attempted
    pub fn attempted(&self) -> usize {
        self.sent + self.failures.len()
    }
}

/// Trait for notifier implementations
///
/// # Failure Semantics
///
/// `broadcast` never fails because of a single recipient: it sends to every
/// eligible recipient and aggregates failures in the [`DeliveryReport`].
/// It returns `Err` only when the broadcast cannot start at all (missing
/// credentials, recipient list unavailable).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a snapshot to every eligible recipient
    async fn broadcast(&self, snapshot: &WeatherSnapshot) -> Result<DeliveryReport>;

    /// Send a plain text to a single address
    async fn send_text(&self, address: &str, text: &str) -> Result<()>;
}
