//! Durable client-side storage for the session record. Values are plain
//! strings keyed by name, mirroring browser local storage; the typed
//! [`AuthStorage`] view knows the layout. The layout has no version, so every
//! field may be absent or stale; unreadable values read as absent.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::{
    error::StorageError,
    types::{SchoolRef, User},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub const KEY_AUTH_USER: &str = "auth_user";
pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_REDIRECT_AFTER_LOGIN: &str = "redirect_after_login";
pub const KEY_AUTH_TYPE: &str = "auth_type";
pub const KEY_SCHOOL_INFO: &str = "school_info";

const AUTH_KEYS: [&str; 5] = [
    KEY_AUTH_USER,
    KEY_ACCESS_TOKEN,
    KEY_REFRESH_TOKEN,
    KEY_AUTH_TYPE,
    KEY_SCHOOL_INFO,
];

/// A string key/value store. Writes are applied as one batch so a single
/// logical update never leaves half of its keys behind.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    /// Returns `StorageError` when the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Applies a batch of writes; `None` removes the key.
    ///
    /// # Errors
    /// Returns `StorageError` when the backing medium cannot be written.
    fn apply(&self, changes: &[(&str, Option<&str>)]) -> Result<(), StorageError>;

    /// # Errors
    /// See [`KeyValueStore::apply`].
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.apply(&[(key, Some(value))])
    }

    /// # Errors
    /// See [`KeyValueStore::apply`].
    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.apply(&[(key, None)])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    Regular,
    School,
}

impl AuthKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::School => "school",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "regular" => Some(Self::Regular),
            "school" => Some(Self::School),
            _ => None,
        }
    }
}

/// School context remembered after a school login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolInfo {
    pub school_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<SchoolRef>,
}

/// Everything the durable store knows about the session.
#[derive(Debug, Default)]
pub struct PersistedAuthRecord {
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub user: Option<User>,
    pub auth_kind: Option<AuthKind>,
    pub school_info: Option<SchoolInfo>,
}

/// Typed view over a [`KeyValueStore`] holding the session layout.
#[derive(Clone)]
pub struct AuthStorage {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for AuthStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStorage").finish_non_exhaustive()
    }
}

impl AuthStorage {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// # Errors
    /// Returns `StorageError` when the store cannot be read.
    pub fn access_token(&self) -> Result<Option<SecretString>, StorageError> {
        self.token(KEY_ACCESS_TOKEN)
    }

    /// # Errors
    /// Returns `StorageError` when the store cannot be read.
    pub fn refresh_token(&self) -> Result<Option<SecretString>, StorageError> {
        self.token(KEY_REFRESH_TOKEN)
    }

    /// Reads the stored user; a record that no longer parses counts as absent.
    ///
    /// # Errors
    /// Returns `StorageError` when the store cannot be read.
    pub fn user(&self) -> Result<Option<User>, StorageError> {
        let Some(raw) = self.store.get(KEY_AUTH_USER)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                warn!("Ignoring malformed stored user record: {}", err);
                Ok(None)
            }
        }
    }

    /// # Errors
    /// Returns `StorageError` when the store cannot be read.
    pub fn auth_kind(&self) -> Result<Option<AuthKind>, StorageError> {
        Ok(self
            .store
            .get(KEY_AUTH_TYPE)?
            .as_deref()
            .and_then(AuthKind::parse))
    }

    /// # Errors
    /// Returns `StorageError` when the store cannot be read.
    pub fn school_info(&self) -> Result<Option<SchoolInfo>, StorageError> {
        let Some(raw) = self.store.get(KEY_SCHOOL_INFO)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(info) => Ok(Some(info)),
            Err(err) => {
                warn!("Ignoring malformed stored school info: {}", err);
                Ok(None)
            }
        }
    }

    /// # Errors
    /// Returns `StorageError` when the store cannot be read.
    pub fn load_record(&self) -> Result<PersistedAuthRecord, StorageError> {
        Ok(PersistedAuthRecord {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token()?,
            user: self.user()?,
            auth_kind: self.auth_kind()?,
            school_info: self.school_info()?,
        })
    }

    /// Replaces the whole persisted session in one write.
    ///
    /// # Errors
    /// Returns `StorageError` when the record cannot be encoded or written.
    pub fn save_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        user: &User,
        kind: AuthKind,
        school_info: Option<&SchoolInfo>,
    ) -> Result<(), StorageError> {
        let user = serde_json::to_string(user)?;
        let school_info = school_info.map(serde_json::to_string).transpose()?;

        self.store.apply(&[
            (KEY_ACCESS_TOKEN, Some(access_token)),
            (KEY_REFRESH_TOKEN, Some(refresh_token)),
            (KEY_AUTH_USER, Some(&user)),
            (KEY_AUTH_TYPE, Some(kind.as_str())),
            (KEY_SCHOOL_INFO, school_info.as_deref()),
        ])
    }

    /// # Errors
    /// Returns `StorageError` when the store cannot be written.
    pub fn set_access_token(&self, access_token: &str) -> Result<(), StorageError> {
        self.store.set(KEY_ACCESS_TOKEN, access_token)
    }

    /// # Errors
    /// Returns `StorageError` when the user cannot be encoded or written.
    pub fn set_user(&self, user: &User) -> Result<(), StorageError> {
        let raw = serde_json::to_string(user)?;
        self.store.set(KEY_AUTH_USER, &raw)
    }

    /// # Errors
    /// Returns `StorageError` when the store cannot be read.
    pub fn redirect_intent(&self) -> Result<Option<String>, StorageError> {
        self.store.get(KEY_REDIRECT_AFTER_LOGIN)
    }

    /// # Errors
    /// Returns `StorageError` when the store cannot be written.
    pub fn set_redirect_intent(&self, path: &str) -> Result<(), StorageError> {
        self.store.set(KEY_REDIRECT_AFTER_LOGIN, path)
    }

    /// Returns the stored redirect intent and removes it.
    ///
    /// # Errors
    /// Returns `StorageError` when the store cannot be read or written.
    pub fn take_redirect_intent(&self) -> Result<Option<String>, StorageError> {
        let intent = self.store.get(KEY_REDIRECT_AFTER_LOGIN)?;
        if intent.is_some() {
            self.store.remove(KEY_REDIRECT_AFTER_LOGIN)?;
        }
        Ok(intent.filter(|path| !path.trim().is_empty()))
    }

    /// Removes tokens and user data but keeps a pending redirect intent.
    ///
    /// # Errors
    /// Returns `StorageError` when the store cannot be written.
    pub fn clear_auth(&self) -> Result<(), StorageError> {
        let changes: Vec<(&str, Option<&str>)> = AUTH_KEYS.iter().map(|key| (*key, None)).collect();
        self.store.apply(&changes)
    }

    /// Removes every key this crate writes.
    ///
    /// # Errors
    /// Returns `StorageError` when the store cannot be written.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        let mut changes: Vec<(&str, Option<&str>)> =
            AUTH_KEYS.iter().map(|key| (*key, None)).collect();
        changes.push((KEY_REDIRECT_AFTER_LOGIN, None));
        self.store.apply(&changes)
    }

    fn token(&self, key: &str) -> Result<Option<SecretString>, StorageError> {
        Ok(self
            .store
            .get(key)?
            .filter(|token| !token.trim().is_empty())
            .map(SecretString::from))
    }
}
