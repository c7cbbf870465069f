// # File Account Store
//
// File-based implementation of AccountStore with crash recovery.
//
// ## Purpose
//
// Keeps users, link tokens and the global default location across daemon
// restarts.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "users": {
//     "anna": { "username": "anna", "notify": true, "telegram_chat_id": "42", ... }
//   },
//   "link_tokens": {},
//   "default_location": { "lat": 45.46, "lon": 9.19, "place": "Milano (MI), Italia" }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use super::{AccountData, DEFAULT_HASH_COST, validate_credentials};
use crate::error::{Error, Result};
use crate::traits::{AccountStore, DefaultLocation, Recipient, RecipientSource, User};

/// Account file format version
const ACCOUNT_FILE_VERSION: &str = "1.0";

/// File-based account store with crash recovery
///
/// Every mutation is written through to disk before the call returns.
///
/// # Example
///
/// ```rust,no_run
/// use meteo_core::accounts::FileAccountStore;
/// use meteo_core::traits::AccountStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileAccountStore::new("/var/lib/meteo/accounts.json").await?;
///     store.create_user("anna", "secret").await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileAccountStore {
    path: PathBuf,
    state: Arc<RwLock<AccountData>>,
    /// Serializes snapshot-and-write so an older snapshot never lands last
    io_lock: Mutex<()>,
    hash_cost: u32,
}

/// Serializable account file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct AccountFileFormat {
    version: String,
    #[serde(flatten)]
    data: AccountData,
}

impl FileAccountStore {
    /// Create or load a file account store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing file
    /// 3. If it is corrupted, try to load the backup
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_hash_cost(path, DEFAULT_HASH_COST).await
    }

    /// Like [`FileAccountStore::new`] with an explicit bcrypt cost
    pub async fn with_hash_cost<P: AsRef<Path>>(path: P, hash_cost: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create account directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let data = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(data)),
            io_lock: Mutex::new(()),
            hash_cost,
        })
    }

    /// Load accounts from file with automatic recovery
    async fn load_with_recovery(path: &Path) -> Result<AccountData> {
        match Self::load(path).await {
            Ok(data) => {
                tracing::debug!("Loaded account file: {} users", data.users.len());
                Ok(data)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Account file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty account store.");
                    return Ok(AccountData::default());
                }

                match Self::load(&backup_path).await {
                    Ok(data) => {
                        tracing::info!("Recovered accounts from backup: {} users", data.users.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore account file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(data)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty account store.",
                            backup_err
                        );
                        Ok(AccountData::default())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load accounts from file (missing file = empty store)
    async fn load(path: &Path) -> Result<AccountData> {
        if !path.exists() {
            tracing::debug!("Account file does not exist: {}", path.display());
            return Ok(AccountData::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::account_store(format!(
                "Failed to read account file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: AccountFileFormat = serde_json::from_str(&content)?;

        if file.version != ACCOUNT_FILE_VERSION {
            tracing::warn!(
                "Account file version mismatch: expected {}, got {}. Attempting to load anyway.",
                ACCOUNT_FILE_VERSION,
                file.version
            );
        }

        Ok(file.data)
    }

    /// Write the current state atomically (temp file, backup, rename)
    async fn write_state(&self) -> Result<()> {
        let _io = self.io_lock.lock().await;

        let json = {
            let guard = self.state.read().await;
            let file = AccountFileFormat {
                version: ACCOUNT_FILE_VERSION.to_string(),
                data: guard.clone(),
            };
            serde_json::to_string_pretty(&file)?
        };

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::account_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create account backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::account_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Account file written: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl RecipientSource for FileAccountStore {
    async fn eligible_recipients(&self) -> Result<Vec<Recipient>> {
        Ok(self.state.read().await.recipients())
    }
}

#[async_trait]
impl AccountStore for FileAccountStore {
    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(username).cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.state
            .write()
            .await
            .users
            .insert(user.username.clone(), user.clone());
        self.write_state().await
    }

    async fn create_user(&self, username: &str, password: &str) -> Result<User> {
        validate_credentials(username, password)?;
        let hash = bcrypt::hash(password, self.hash_cost)?;
        let user = self.state.write().await.insert_new_user(username, hash)?;
        self.write_state().await?;
        Ok(user)
    }

    async fn verify_password(&self, username: &str, password: &str) -> Result<User> {
        self.state.read().await.check_password(username, password)
    }

    async fn issue_link_token(&self, username: &str) -> Result<String> {
        let token = self.state.write().await.insert_link_token(username)?;
        self.write_state().await?;
        Ok(token)
    }

    async fn redeem_link_token(&self, token: &str, chat_id: &str) -> Result<Option<String>> {
        let redeemed = self.state.write().await.redeem(token, chat_id)?;
        if redeemed.is_some() {
            self.write_state().await?;
        }
        Ok(redeemed)
    }

    async fn default_location(&self) -> Result<Option<DefaultLocation>> {
        Ok(self.state.read().await.default_location.clone())
    }

    async fn set_default_location(&self, location: &DefaultLocation) -> Result<()> {
        self.state.write().await.default_location = Some(location.clone());
        self.write_state().await
    }

    async fn flush(&self) -> Result<()> {
        self.write_state().await
    }
}
