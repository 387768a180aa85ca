//! Authenticated Fetch Wrapper. Every service that needs authenticated HTTP is
//! handed an [`AuthClient`]; there is no ambient global client.
//!
//! Flow Overview: on a protected route the bearer token is read fresh from
//! durable storage and attached. A 401 triggers one refresh and one retry with
//! the new token. If the refresh fails the session is torn down, the current
//! path is remembered and the router is sent to the login page with a
//! `returnUrl`. Responses are handed back untouched.

use crate::{
    config::ClientConfig,
    error::{sanitize_message, Error},
    refresh::{TokenRefresher, REFRESH_PATH},
    routes::{self, Router},
    session::SessionStore,
    types::{decode_json, error_detail},
    APP_USER_AGENT,
};
use reqwest::{header::AUTHORIZATION, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// A request that can be issued more than once (the retry rebuilds it).
#[derive(Clone, Debug)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// # Errors
    /// Returns `Error::Serialization` if `body` cannot be encoded as JSON.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, Error> {
        let body = serde_json::to_value(body)
            .map_err(|err| Error::Serialization(format!("Failed to encode request: {err}")))?;
        self.body = Some(body);
        Ok(self)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Clone, Debug)]
pub struct AuthClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    store: Arc<SessionStore>,
    router: Arc<Router>,
    refresher: Arc<TokenRefresher>,
}

impl AuthClient {
    /// # Errors
    /// Returns `Error::Config` if the HTTP client cannot be built.
    pub fn new(
        config: Arc<ClientConfig>,
        store: Arc<SessionStore>,
        router: Arc<Router>,
    ) -> Result<Self, Error> {
        // the cookie jar carries any cookie session next to the bearer token
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .cookie_store(true)
            .build()
            .map_err(|err| Error::Config(format!("Failed to build HTTP client: {err}")))?;

        let refresher = Arc::new(TokenRefresher::new(
            http.clone(),
            config.endpoint(REFRESH_PATH),
            Arc::clone(&store),
        ));

        Ok(Self {
            http,
            config,
            store,
            router,
            refresher,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    #[must_use]
    pub fn refresher(&self) -> &Arc<TokenRefresher> {
        &self.refresher
    }

    /// Locale of the current route, or the configured default.
    #[must_use]
    pub fn locale(&self) -> String {
        routes::locale_of(&self.router.current(), &self.config.locale)
    }

    /// Sends `request`, recovering once from an expired access token.
    ///
    /// # Errors
    /// Returns an error only when the server cannot be reached or the request
    /// cannot be built; HTTP error statuses are returned as responses.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, Error> {
        let current_path = self.router.current();

        if routes::is_public(&current_path) {
            return self.dispatch(request, None).await;
        }

        let token = self.stored_access_token();
        let response = self.dispatch(request, token.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("request rejected with 401; refreshing access token");

        if self.refresher.refresh_after(token.as_ref()).await {
            let token = self.stored_access_token();
            return self.dispatch(request, token.as_ref()).await;
        }

        if !routes::is_login(&current_path) {
            self.expire_session(&current_path);
        }

        Ok(response)
    }

    /// Sends `request` and decodes a JSON success body into `T`.
    ///
    /// # Errors
    /// Returns `Error::Http` for non-2xx statuses and `Error::Protocol` when the
    /// body does not decode into `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        let response = self.send(request).await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(http_error(status, &body));
        }

        Ok(decode_json(&body, "api response")?)
    }

    /// # Errors
    /// See [`AuthClient::send_json`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.send_json(&ApiRequest::get(path)).await
    }

    /// Sends `request` once, without refresh handling, attaching `token` if given.
    ///
    /// # Errors
    /// Returns an error when the server cannot be reached.
    pub async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&SecretString>,
    ) -> Result<Response, Error> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.config.endpoint(&request.path));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    /// Tears the session down and sends the router to the login page,
    /// remembering `current_path` for the next login.
    pub fn expire_session(&self, current_path: &str) {
        info!("session expired; redirecting to login");

        if let Err(e) = self.store.clear() {
            error!("Failed to clear stored session: {}", e);
        }

        if let Err(e) = self.store.storage().set_redirect_intent(current_path) {
            warn!("Failed to store redirect intent: {}", e);
        }

        let target = routes::login_path(&self.locale(), Some(current_path));
        self.router.navigate(target);
    }

    fn stored_access_token(&self) -> Option<SecretString> {
        match self.store.storage().access_token() {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read stored access token: {}", e);
                None
            }
        }
    }
}

/// Builds an `Error::Http` from a failed response, preferring the API `detail`.
pub(crate) fn http_error(status: StatusCode, body: &[u8]) -> Error {
    let message = error_detail(body)
        .or_else(|| sanitize_message(&String::from_utf8_lossy(body)))
        .unwrap_or_else(|| "Request failed.".to_string());

    Error::Http {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_request_builders() {
        let request = ApiRequest::post("/api/v1/courses")
            .query("page", "2")
            .json(&json!({"name": "Algebra"}))
            .unwrap();

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.path(), "/api/v1/courses");
        assert_eq!(request.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(request.body, Some(json!({"name": "Algebra"})));
    }

    #[test]
    fn http_error_prefers_detail() {
        let err = http_error(StatusCode::BAD_REQUEST, br#"{"detail":"School code not found"}"#);
        assert!(matches!(
            err,
            Error::Http { status: 400, ref message } if message == "School code not found"
        ));

        let err = http_error(StatusCode::BAD_GATEWAY, b"upstream down");
        assert!(matches!(
            err,
            Error::Http { status: 502, ref message } if message == "upstream down"
        ));

        let err = http_error(StatusCode::INTERNAL_SERVER_ERROR, b"");
        assert!(matches!(
            err,
            Error::Http { status: 500, ref message } if message == "Request failed."
        ));
    }
}
