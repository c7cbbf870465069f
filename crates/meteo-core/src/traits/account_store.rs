// # Account Store Trait
//
// Defines the interface for the user/account store consumed by the HTTP
// layer and the notifier.
//
// ## Purpose
//
// - Registered users with hashed passwords
// - Per-user notification opt-in and delivery address
// - One-shot link tokens binding a chat to a user
// - The admin-chosen global default location
//
// ## Implementations
//
// - In-memory: `MemoryAccountStore` (process lifetime only)
// - File-based: `FileAccountStore` (JSON with backup recovery)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A registered user
///
/// This is the stored representation and includes the password hash; use
/// [`UserProfile`] for anything leaving the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user name
    pub username: String,
    /// Preferred city label
    #[serde(default)]
    pub city: String,
    /// Personal latitude (0 when unset)
    #[serde(default)]
    pub lat: f64,
    /// Personal longitude (0 when unset)
    #[serde(default)]
    pub lon: f64,
    /// Telegram chat id used as delivery address (empty when unlinked)
    #[serde(default)]
    pub telegram_chat_id: String,
    /// Notification opt-in
    #[serde(default)]
    pub notify: bool,
    /// Whether the user may change the global default location
    #[serde(default)]
    pub is_admin: bool,
    /// bcrypt hash (empty when no password was ever set)
    #[serde(default)]
    pub password_hash: String,
}

impl User {
    /// Create a user without password
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Whether the user has personal coordinates
    pub fn has_location(&self) -> bool {
        self.lat != 0.0 || self.lon != 0.0
    }

    /// Whether broadcasts should reach this user
    pub fn is_recipient(&self) -> bool {
        self.notify && !self.telegram_chat_id.is_empty()
    }
}

/// Public view of a [`User`] (no password hash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Unique user name
    pub username: String,
    /// Preferred city label
    pub city: String,
    /// Personal latitude
    #[serde(skip_serializing_if = "is_zero")]
    pub lat: f64,
    /// Personal longitude
    #[serde(skip_serializing_if = "is_zero")]
    pub lon: f64,
    /// Telegram chat id
    #[serde(skip_serializing_if = "String::is_empty")]
    pub telegram_chat_id: String,
    /// Notification opt-in
    pub notify: bool,
    /// Admin flag
    pub is_admin: bool,
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            city: user.city.clone(),
            lat: user.lat,
            lon: user.lon,
            telegram_chat_id: user.telegram_chat_id.clone(),
            notify: user.notify,
            is_admin: user.is_admin,
        }
    }
}

/// One eligible broadcast recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// User name (for logging)
    pub username: String,
    /// Delivery address (chat id)
    pub address: String,
}

/// Persisted global default location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultLocation {
    /// Latitude
    pub lat: f64,
    /// Longitude
    pub lon: f64,
    /// Display label resolved when the location was set
    #[serde(default)]
    pub place: String,
}

/// Source of broadcast recipients
///
/// Queried fresh on every delivery cycle; implementations must not hand out
/// a cached list.
#[async_trait]
pub trait RecipientSource: Send + Sync {
    /// Users that opted in and have a delivery address
    async fn eligible_recipients(&self) -> Result<Vec<Recipient>>;
}

/// Trait for account store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up a user by name
    async fn get_user(&self, username: &str) -> Result<Option<User>>;

    /// Insert or replace a user
    async fn upsert_user(&self, user: &User) -> Result<()>;

    /// Register a new user with a password
    ///
    /// # Errors
    ///
    /// - `Error::Conflict` if the username already exists
    /// - `Error::InvalidInput` if username or password is empty
    async fn create_user(&self, username: &str, password: &str) -> Result<User>;

    /// Check credentials and return the user
    ///
    /// # Errors
    ///
    /// - `Error::Authentication` on unknown user, missing hash or mismatch
    async fn verify_password(&self, username: &str, password: &str) -> Result<User>;

    /// Issue a one-shot token linking a chat to `username`
    async fn issue_link_token(&self, username: &str) -> Result<String>;

    /// Redeem an unused token for `chat_id`
    ///
    /// On success the user gets the chat id as delivery address, is opted in,
    /// and the token is marked used. Returns the username, or `None` for an
    /// unknown or already used token.
    async fn redeem_link_token(&self, token: &str, chat_id: &str) -> Result<Option<String>>;

    /// The persisted global default location
    async fn default_location(&self) -> Result<Option<DefaultLocation>>;

    /// Persist the global default location
    async fn set_default_location(&self, location: &DefaultLocation) -> Result<()>;

    /// Flush pending changes to durable storage
    async fn flush(&self) -> Result<()>;
}
