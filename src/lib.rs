//! # Campus (session client)
//!
//! `campus` owns the authentication and session lifecycle of a client talking
//! to the Campus education platform API. It keeps the access/refresh token pair
//! and the current user in a [`session::SessionStore`], mirrors them to a
//! durable key/value store, and hands every service that needs authenticated
//! HTTP an explicit [`client::AuthClient`].
//!
//! ## Flow Overview
//!
//! 1. **Bootstrap:** [`auth::Auth::bootstrap`] seeds the session from the
//!    persisted record, then validates it with `GET /api/v1/auth/me` unless the
//!    current route is public.
//! 2. **Requests:** [`client::AuthClient::send`] attaches the bearer token read
//!    fresh from storage. A 401 triggers one refresh and one retry.
//! 3. **Refresh failure:** the session is torn down and the router is sent to
//!    `/<locale>/login?returnUrl=<path>`; the path is remembered and restored by
//!    the next successful login.
//! 4. **Onboarding:** [`guard`] keeps users that have not onboarded inside the
//!    onboarding routes.
//!
//! Token material is held as `SecretString` and must never be logged.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod refresh;
pub mod routes;
pub mod session;
pub mod storage;
pub mod types;

pub use error::{Error, ProtocolError, StorageError};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
