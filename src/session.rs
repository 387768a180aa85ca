//! Token Store: the single owner of the current session. Consumers read it
//! through [`SessionStore::snapshot`] or subscribe to [`SessionSnapshot`]
//! updates; only the narrow mutation API below changes it. Tokens and user
//! are written to durable storage first; memory changes only once the write
//! succeeded. Snapshots carry no token material.

use crate::{
    error::StorageError,
    storage::{AuthKind, AuthStorage, SchoolInfo},
    types::User,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Default)]
struct Session {
    access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    user: Option<User>,
}

/// Observable, secret-free view of the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub authenticated: bool,
    /// How the session was established; `None` when anonymous or unknown.
    pub auth_kind: Option<AuthKind>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct SessionStore {
    storage: AuthStorage,
    session: Mutex<Session>,
    state: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    #[must_use]
    pub fn new(storage: AuthStorage) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            storage,
            session: Mutex::new(Session::default()),
            state,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &AuthStorage {
        &self.storage
    }

    /// Seeds the in-memory session from the persisted record.
    ///
    /// # Errors
    /// Returns `StorageError` when the durable store cannot be read.
    pub fn hydrate(&self) -> Result<(), StorageError> {
        let record = self.storage.load_record()?;
        let authenticated = record.access_token.is_some();
        let user = record.user.clone();
        let auth_kind = record.auth_kind;

        {
            let mut session = self.lock();
            session.access_token = record.access_token;
            session.refresh_token = record.refresh_token;
            session.user = record.user;
        }

        debug!(authenticated, has_user = user.is_some(), "session hydrated");

        self.state.send_modify(|state| {
            state.user = user;
            state.authenticated = authenticated;
            state.auth_kind = auth_kind;
        });

        Ok(())
    }

    /// Replaces the whole session after a successful credential flow.
    ///
    /// # Errors
    /// Returns `StorageError` when the session cannot be persisted.
    pub fn replace(
        &self,
        access_token: &SecretString,
        refresh_token: &SecretString,
        user: User,
        kind: AuthKind,
        school_info: Option<&SchoolInfo>,
    ) -> Result<(), StorageError> {
        self.storage.save_session(
            access_token.expose_secret(),
            refresh_token.expose_secret(),
            &user,
            kind,
            school_info,
        )?;

        {
            let mut session = self.lock();
            session.access_token = Some(access_token.clone());
            session.refresh_token = Some(refresh_token.clone());
            session.user = Some(user.clone());
        }

        self.state.send_modify(|state| {
            state.user = Some(user);
            state.authenticated = true;
            state.auth_kind = Some(kind);
            state.error = None;
        });

        Ok(())
    }

    /// Swaps in a refreshed access token; the refresh token and user stay.
    ///
    /// # Errors
    /// Returns `StorageError` when the token cannot be persisted.
    pub fn set_access_token(&self, access_token: &SecretString) -> Result<(), StorageError> {
        self.storage.set_access_token(access_token.expose_secret())?;
        self.lock().access_token = Some(access_token.clone());
        self.state.send_modify(|state| state.authenticated = true);
        Ok(())
    }

    /// # Errors
    /// Returns `StorageError` when the user cannot be persisted.
    pub fn set_user(&self, user: User) -> Result<(), StorageError> {
        self.storage.set_user(&user)?;
        self.lock().user = Some(user.clone());
        self.publish_user(Some(user));
        Ok(())
    }

    /// Re-reads the user from durable storage into memory. A missing durable
    /// record leaves the in-memory user as is.
    ///
    /// # Errors
    /// Returns `StorageError` when the durable store cannot be read.
    pub fn sync_user_from_storage(&self) -> Result<(), StorageError> {
        if let Some(user) = self.storage.user()? {
            self.lock().user = Some(user.clone());
            self.publish_user(Some(user));
        }
        Ok(())
    }

    /// Drops tokens and user, in memory and on disk. A pending redirect intent
    /// survives so the next login can restore it.
    ///
    /// # Errors
    /// Returns `StorageError` when the durable store cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.clear_memory();
        self.storage.clear_auth()
    }

    /// Like [`SessionStore::clear`] but also forgets the redirect intent.
    ///
    /// # Errors
    /// Returns `StorageError` when the durable store cannot be written.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        self.clear_memory();
        self.storage.clear_all()
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.loading != loading;
            state.loading = loading;
            changed
        });
    }

    pub fn set_error(&self, error: Option<String>) {
        self.state.send_modify(|state| state.error = error);
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock().access_token.is_some()
    }

    /// In-memory access token. Requests read the durable copy instead.
    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.lock().access_token.clone()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.lock().refresh_token.clone()
    }

    fn clear_memory(&self) {
        *self.lock() = Session::default();
        self.state.send_modify(|state| {
            state.user = None;
            state.authenticated = false;
            state.auth_kind = None;
        });
    }

    fn publish_user(&self, user: Option<User>) {
        self.state.send_if_modified(|state| {
            if state.user == user {
                false
            } else {
                state.user = user;
                true
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
