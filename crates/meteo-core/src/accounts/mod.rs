// # Account Store Implementations
//
// This module provides implementations of the AccountStore trait for
// different persistence strategies. Both share the [`AccountData`] model
// and its bookkeeping rules; they differ only in durability.

pub mod file;
pub mod memory;

pub use file::FileAccountStore;
pub use memory::MemoryAccountStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::traits::{DefaultLocation, Recipient, User};

/// bcrypt cost used for new passwords
pub const DEFAULT_HASH_COST: u32 = bcrypt::DEFAULT_COST;

/// A one-shot token binding a chat to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkToken {
    /// User the token was issued for
    pub username: String,
    /// Issue time
    pub created_at: DateTime<Utc>,
    /// Whether the token was already redeemed
    pub used: bool,
    /// Chat that redeemed the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

/// Everything an account store keeps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct AccountData {
    #[serde(default)]
    pub(crate) users: HashMap<String, User>,
    #[serde(default)]
    pub(crate) link_tokens: HashMap<String, LinkToken>,
    #[serde(default)]
    pub(crate) default_location: Option<DefaultLocation>,
}

impl AccountData {
    pub(crate) fn insert_new_user(&mut self, username: &str, password_hash: String) -> Result<User> {
        if self.users.contains_key(username) {
            return Err(Error::conflict(format!("username already exists: {}", username)));
        }

        let user = User {
            password_hash,
            ..User::new(username)
        };
        self.users.insert(username.to_string(), user.clone());
        Ok(user)
    }

    pub(crate) fn check_password(&self, username: &str, password: &str) -> Result<User> {
        let user = self
            .users
            .get(username)
            .ok_or_else(|| Error::auth("invalid credentials"))?;

        if user.password_hash.is_empty() {
            return Err(Error::auth("no password set"));
        }

        match bcrypt::verify(password, &user.password_hash) {
            Ok(true) => Ok(user.clone()),
            Ok(false) => Err(Error::auth("invalid credentials")),
            Err(e) => {
                tracing::warn!("Stored password hash for {} is unreadable: {}", username, e);
                Err(Error::auth("invalid credentials"))
            }
        }
    }

    pub(crate) fn insert_link_token(&mut self, username: &str) -> Result<String> {
        if !self.users.contains_key(username) {
            return Err(Error::not_found(format!("user {}", username)));
        }

        let token = hex::encode(rand::random::<[u8; 16]>());
        self.link_tokens.insert(
            token.clone(),
            LinkToken {
                username: username.to_string(),
                created_at: Utc::now(),
                used: false,
                chat_id: None,
            },
        );
        Ok(token)
    }

    pub(crate) fn redeem(&mut self, token: &str, chat_id: &str) -> Result<Option<String>> {
        let Some(link) = self.link_tokens.get(token).filter(|link| !link.used) else {
            return Ok(None);
        };
        let username = link.username.clone();

        let user = self
            .users
            .get_mut(&username)
            .ok_or_else(|| Error::account_store(format!("token owner {} no longer exists", username)))?;
        user.telegram_chat_id = chat_id.to_string();
        user.notify = true;

        if let Some(link) = self.link_tokens.get_mut(token) {
            link.used = true;
            link.chat_id = Some(chat_id.to_string());
        }

        Ok(Some(username))
    }

    pub(crate) fn recipients(&self) -> Vec<Recipient> {
        let mut recipients: Vec<Recipient> = self
            .users
            .values()
            .filter(|user| user.is_recipient())
            .map(|user| Recipient {
                username: user.username.clone(),
                address: user.telegram_chat_id.clone(),
            })
            .collect();
        recipients.sort_by(|a, b| a.username.cmp(&b.username));
        recipients
    }
}

/// Reject empty credentials before any hashing work
pub(crate) fn validate_credentials(username: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(Error::invalid_input("username and password are required"));
    }
    Ok(())
}
