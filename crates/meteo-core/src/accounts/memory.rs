// # Memory Account Store
//
// In-memory implementation of AccountStore.
//
// ## Purpose
//
// Provides a simple, fast account store that doesn't persist across
// restarts. Used when no store path is configured and in tests.
//
// ## Crash Behavior
//
// - All users, link tokens and the default location are lost on restart
// - Subscribers have to register and link their chat again

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AccountData, DEFAULT_HASH_COST, validate_credentials};
use crate::error::Result;
use crate::traits::{AccountStore, DefaultLocation, Recipient, RecipientSource, User};

/// In-memory account store implementation
///
/// # Example
///
/// ```rust,no_run
/// use meteo_core::accounts::MemoryAccountStore;
/// use meteo_core::traits::AccountStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryAccountStore::new();
///
///     store.create_user("anna", "secret").await?;
///     let user = store.verify_password("anna", "secret").await?;
///     assert_eq!(user.username, "anna");
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryAccountStore {
    inner: Arc<RwLock<AccountData>>,
    hash_cost: u32,
}

impl MemoryAccountStore {
    /// Create a new empty memory account store
    pub fn new() -> Self {
        Self::with_hash_cost(DEFAULT_HASH_COST)
    }

    /// Create a store hashing passwords with the given bcrypt cost
    pub fn with_hash_cost(hash_cost: u32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AccountData::default())),
            hash_cost,
        }
    }

    /// Number of registered users
    pub async fn len(&self) -> usize {
        self.inner.read().await.users.len()
    }

    /// Check if the store has no users
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.users.is_empty()
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecipientSource for MemoryAccountStore {
    async fn eligible_recipients(&self) -> Result<Vec<Recipient>> {
        Ok(self.inner.read().await.recipients())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(username).cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn create_user(&self, username: &str, password: &str) -> Result<User> {
        validate_credentials(username, password)?;
        let hash = bcrypt::hash(password, self.hash_cost)?;
        self.inner.write().await.insert_new_user(username, hash)
    }

    async fn verify_password(&self, username: &str, password: &str) -> Result<User> {
        self.inner.read().await.check_password(username, password)
    }

    async fn issue_link_token(&self, username: &str) -> Result<String> {
        self.inner.write().await.insert_link_token(username)
    }

    async fn redeem_link_token(&self, token: &str, chat_id: &str) -> Result<Option<String>> {
        self.inner.write().await.redeem(token, chat_id)
    }

    async fn default_location(&self) -> Result<Option<DefaultLocation>> {
        Ok(self.inner.read().await.default_location.clone())
    }

    async fn set_default_location(&self, location: &DefaultLocation) -> Result<()> {
        self.inner.write().await.default_location = Some(location.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // Nothing to persist
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn store() -> MemoryAccountStore {
        MemoryAccountStore::with_hash_cost(4)
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let store = store();
        assert!(store.is_empty().await);

        let user = store.create_user("anna", "pw").await.unwrap();
        assert!(!user.password_hash.is_empty());
        assert_ne!(user.password_hash, "pw");
        assert_eq!(store.len().await, 1);

        assert!(store.verify_password("anna", "pw").await.is_ok());
        assert!(matches!(
            store.verify_password("anna", "wrong").await,
            Err(Error::Authentication(_))
        ));
        assert!(matches!(
            store.verify_password("nobody", "pw").await,
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_and_empty_registration() {
        let store = store();
        store.create_user("anna", "pw").await.unwrap();

        assert!(matches!(
            store.create_user("anna", "other").await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            store.create_user("", "pw").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.create_user("bob", "").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_user_without_password_cannot_login() {
        let store = store();
        store.upsert_user(&User::new("guest")).await.unwrap();

        assert!(matches!(
            store.verify_password("guest", "").await,
            Err(Error::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_linking_makes_user_a_recipient() {
        let store = store();
        store.create_user("anna", "pw").await.unwrap();
        assert!(store.eligible_recipients().await.unwrap().is_empty());

        let token = store.issue_link_token("anna").await.unwrap();
        let linked = store.redeem_link_token(&token, "12345").await.unwrap();
        assert_eq!(linked.as_deref(), Some("anna"));

        let recipients = store.eligible_recipients().await.unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].address, "12345");
    }

    #[test]
    fn test_link_token_is_single_use() {
        let store = store();
        tokio_test::block_on(async {
            tokio_test::assert_err!(store.issue_link_token("ghost").await);

            store.upsert_user(&User::new("anna")).await.unwrap();
            let token = tokio_test::assert_ok!(store.issue_link_token("anna").await);
            assert_eq!(token.len(), 32);

            let first = tokio_test::assert_ok!(store.redeem_link_token(&token, "1").await);
            assert_eq!(first.as_deref(), Some("anna"));

            let second = tokio_test::assert_ok!(store.redeem_link_token(&token, "2").await);
            assert_eq!(second, None);

            let user = store.get_user("anna").await.unwrap().unwrap();
            assert_eq!(user.telegram_chat_id, "1");
        });
    }

    #[tokio::test]
    async fn test_default_location_round_trip() {
        let store = store();
        assert_eq!(store.default_location().await.unwrap(), None);

        let location = DefaultLocation {
            lat: 41.9,
            lon: 12.5,
            place: "Roma (RM), Italia".into(),
        };
        store.set_default_location(&location).await.unwrap();
        assert_eq!(store.default_location().await.unwrap(), Some(location));
    }
}
