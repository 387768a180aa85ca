//! Credential flows and session bootstrap. [`Auth`] is the surface UI code
//! (or the CLI) talks to: `login`, `login_school`, `register`, `logout`,
//! `bootstrap`, plus the observable `user` / `loading` / `error` state.
//!
//! Actions never return errors. Failures are logged and surfaced as a `false`
//! return with a user-facing message in [`Auth::error`]; passive session loss
//! becomes a redirect. Passwords and tokens must never be logged.

use crate::{
    client::{ApiRequest, AuthClient},
    config::ClientConfig,
    error::Error,
    guard,
    refresh::RenewalHandle,
    routes::{self, Router},
    session::{SessionSnapshot, SessionStore},
    storage::{AuthKind, AuthStorage, KeyValueStore, SchoolInfo},
    types::{
        decode_json, error_detail, LoginRequest, LoginResponse, RegisterRequest,
        SchoolLoginRequest, User, UserType,
    },
};
use regex::Regex;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

pub const LOGIN_PATH: &str = "/api/v1/auth/login";
pub const SCHOOL_LOGIN_PATH: &str = "/api/v1/auth/school-login";
pub const REGISTER_PATH: &str = "/api/v1/auth/register";
pub const ME_PATH: &str = "/api/v1/auth/me";
pub const LOGOUT_PATH: &str = "/api/v1/auth/logout";

pub const LOGIN_FAILED: &str = "Authentication failed. Please try again.";
pub const REGISTER_FAILED: &str = "Registration failed. Please try again.";
pub const NETWORK_FAILED: &str = "Unable to reach the server. Please try again.";
pub const UNEXPECTED_RESPONSE: &str = "Unexpected response from the server. Please try again.";
pub const STORAGE_FAILED: &str = "Unable to save your session on this device.";
pub const INVALID_EMAIL: &str = "Please enter a valid email address.";

/// Registration form as collected from the user.
#[derive(Debug)]
pub struct RegisterForm {
    pub email: String,
    /// Falls back to the local part of `email` when empty.
    pub username: String,
    pub password: SecretString,
    pub full_name: String,
    pub user_type: UserType,
    pub has_onboarded: bool,
}

impl RegisterForm {
    fn username(&self) -> String {
        let username = self.username.trim();
        if username.is_empty() {
            self.email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()
        } else {
            username.to_string()
        }
    }
}

static EMAIL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(email))
}

/// A credential call the server turned down; only the API `detail` is shown.
fn rejected(status: StatusCode, body: &[u8], fallback: &str) -> Error {
    Error::Http {
        status: status.as_u16(),
        message: error_detail(body).unwrap_or_else(|| fallback.to_string()),
    }
}

/// Maps a failed action to the message shown to the user.
fn user_message(err: &Error, fallback: &str) -> String {
    match err {
        Error::Http { message, .. } => message.clone(),
        Error::Network(_) | Error::Timeout(_) => NETWORK_FAILED.to_string(),
        Error::Protocol(_) => UNEXPECTED_RESPONSE.to_string(),
        Error::Storage(_) => STORAGE_FAILED.to_string(),
        Error::Config(_) | Error::Serialization(_) => fallback.to_string(),
    }
}

/// Session lifecycle controller.
#[derive(Debug)]
pub struct Auth {
    client: AuthClient,
    renewal: Mutex<Option<RenewalHandle>>,
}

impl Auth {
    /// Wires store, router and client around `store` as the durable backend.
    ///
    /// # Errors
    /// Returns `Error::Config` if the HTTP client cannot be built.
    pub fn new(
        config: ClientConfig,
        backend: Arc<dyn KeyValueStore>,
        initial_path: impl Into<String>,
    ) -> Result<Self, Error> {
        let store = Arc::new(SessionStore::new(AuthStorage::new(backend)));
        let router = Arc::new(Router::new(initial_path));
        let client = AuthClient::new(Arc::new(config), store, router)?;
        Ok(Self::from_client(client))
    }

    #[must_use]
    pub fn from_client(client: AuthClient) -> Self {
        Self {
            client,
            renewal: Mutex::new(None),
        }
    }

    /// Client to hand to services that need authenticated HTTP.
    #[must_use]
    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        self.client.router()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        self.client.store()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.store().user()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.store().loading()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.store().error()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.store().subscribe()
    }

    /// Session Bootstrapper: seeds the session from durable storage, then
    /// validates it against the API unless the current route is public.
    /// Returns whether a session is active afterwards.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> bool {
        if let Err(e) = self.store().hydrate() {
            error!("Failed to load stored session: {}", e);
        }

        let path = self.router().current();
        if !routes::is_public(&path) && self.store().is_authenticated() {
            self.check_session(&path).await;
        }

        if self.store().is_authenticated() {
            self.start_renewal();
        }

        guard::enforce(self.store(), self.router(), &self.client.config().locale);

        self.store().is_authenticated()
    }

    async fn check_session(&self, path: &str) {
        let response = match self.client.send(&ApiRequest::get(ME_PATH)).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Session check failed, keeping stored session: {}", e);
                return;
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // refresh already failed inside the client
            if self.store().is_authenticated() {
                self.client.expire_session(path);
            }
            return;
        }
        if !status.is_success() {
            warn!("Session check returned {}, keeping stored session", status);
            return;
        }

        let user = match response.bytes().await {
            Ok(body) => decode_json::<User>(&body, "session check"),
            Err(e) => {
                warn!("Failed to read session check body: {}", e);
                return;
            }
        };

        match user {
            Ok(user) => {
                if let Err(e) = self.store().set_user(user) {
                    error!("Failed to persist user: {}", e);
                }
            }
            Err(e) => warn!("Ignoring malformed session check: {}", e),
        }
    }

    /// Logs in with email and password. Returns `true` on success.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &SecretString, user_type: UserType) -> bool {
        let request = LoginRequest {
            email: email.trim(),
            password: password.expose_secret(),
            user_type,
        };

        self.run_login(LOGIN_PATH, &request, AuthKind::Regular, None)
            .await
    }

    /// Logs in a school account. School accounts never go through onboarding.
    #[instrument(skip(self, password))]
    pub async fn login_school(
        &self,
        school_code: &str,
        identifier: &str,
        password: &SecretString,
        user_type: UserType,
    ) -> bool {
        let request = SchoolLoginRequest {
            school_code: school_code.trim(),
            identifier: identifier.trim(),
            password: password.expose_secret(),
            user_type,
        };

        self.run_login(
            SCHOOL_LOGIN_PATH,
            &request,
            AuthKind::School,
            Some(school_code.trim()),
        )
        .await
    }

    /// Registers an account, then logs in with the same credentials.
    #[instrument(skip(self, form), fields(email = %form.email, user_type = %form.user_type))]
    pub async fn register(&self, form: &RegisterForm) -> bool {
        let email = form.email.trim();
        if !valid_email(email) {
            self.store().set_error(Some(INVALID_EMAIL.to_string()));
            return false;
        }

        self.store().set_loading(true);

        let username = form.username();
        let request = RegisterRequest {
            email,
            username: &username,
            password: form.password.expose_secret(),
            full_name: form.full_name.trim(),
            user_type: form.user_type,
            has_onboarded: form.has_onboarded,
        };

        let registered = self.submit_registration(&request).await;

        if let Err(e) = registered {
            warn!("Registration failed: {}", e);
            self.store()
                .set_error(Some(user_message(&e, REGISTER_FAILED)));
            self.store().set_loading(false);
            return false;
        }

        info!("account registered; logging in");

        self.login(email, &form.password, form.user_type).await
    }

    /// Logs out. The server call is best effort; the local session is always
    /// cleared and the router goes back to the locale root.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.stop_renewal();

        let token = self.store().storage().access_token().ok().flatten();
        match self
            .client
            .dispatch(&ApiRequest::post(LOGOUT_PATH), token.as_ref())
            .await
        {
            Ok(response) if !response.status().is_success() => {
                warn!("Logout returned {}", response.status());
            }
            Ok(_) => debug!("server session invalidated"),
            Err(e) => warn!("Logout request failed: {}", e),
        }

        if let Err(e) = self.store().clear_all() {
            error!("Failed to clear stored session: {}", e);
        }
        self.store().set_error(None);

        let locale = self.client.locale();
        self.router().navigate(routes::locale_root(&locale));

        info!("logged out");
    }

    async fn submit_registration(&self, request: &RegisterRequest<'_>) -> Result<(), Error> {
        let request = ApiRequest::post(REGISTER_PATH).json(request)?;
        let response = self.client.dispatch(&request, None).await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            Ok(())
        } else {
            Err(rejected(status, &body, REGISTER_FAILED))
        }
    }

    async fn run_login<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
        kind: AuthKind,
        school_code: Option<&str>,
    ) -> bool {
        self.store().set_loading(true);

        let result = self.exchange_credentials(path, body).await;

        let ok = match result {
            Ok(response) => match self.establish(response, kind, school_code) {
                Ok(()) => true,
                Err(e) => {
                    error!("Failed to store session: {}", e);
                    self.store().set_error(Some(user_message(&e, LOGIN_FAILED)));
                    false
                }
            },
            Err(e) => {
                warn!("Login failed: {}", e);
                self.store().set_error(Some(user_message(&e, LOGIN_FAILED)));
                false
            }
        };

        self.store().set_loading(false);

        ok
    }

    async fn exchange_credentials<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<LoginResponse, Error> {
        let request = ApiRequest::post(path).json(body)?;
        let response = self.client.dispatch(&request, None).await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(rejected(status, &body, LOGIN_FAILED));
        }

        Ok(LoginResponse::parse(&body)?)
    }

    fn establish(
        &self,
        response: LoginResponse,
        kind: AuthKind,
        school_code: Option<&str>,
    ) -> Result<(), Error> {
        let school_info = school_code.map(|code| SchoolInfo {
            school_code: code.to_string(),
            school: response.user.school.clone(),
        });
        let onboarded = response.user.has_onboarded || kind == AuthKind::School;

        self.store().replace(
            &SecretString::from(response.access_token),
            &SecretString::from(response.refresh_token),
            response.user,
            kind,
            school_info.as_ref(),
        )?;

        info!("logged in");

        let target = self.login_target(onboarded);
        self.router().navigate(target);
        self.start_renewal();

        Ok(())
    }

    /// Redirect after login: the remembered path, else the `returnUrl` of the
    /// current login route, else onboarding or the dashboard.
    fn login_target(&self, onboarded: bool) -> String {
        let intent = match self.store().storage().take_redirect_intent() {
            Ok(intent) => intent,
            Err(e) => {
                warn!("Failed to read redirect intent: {}", e);
                None
            }
        };

        let locale = self.client.locale();
        intent
            .or_else(|| routes::return_url(&self.router().current()))
            .unwrap_or_else(|| {
                if onboarded {
                    routes::dashboard_path(&locale)
                } else {
                    routes::onboarding_path(&locale)
                }
            })
    }

    fn start_renewal(&self) {
        let handle = self.client.refresher().spawn_renewal(
            Arc::clone(self.router()),
            self.client.config().token_lifetime,
        );
        // replacing drops (and stops) a previous task
        *self.renewal.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn stop_renewal(&self) {
        if let Some(handle) = self
            .renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
        }
    }

    /// Whether proactive renewal is currently scheduled.
    #[must_use]
    pub fn renewal_active(&self) -> bool {
        self.renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(RenewalHandle::is_running)
    }
}
