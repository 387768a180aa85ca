//! Client configuration: API base URL, default locale, where the durable
//! session record lives and how long an access token is assumed to live.
//! Configuration values are public; never store secrets here.

use crate::error::Error;
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Default request timeout applied to every HTTP call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Assumed access token lifetime when the backend does not say otherwise.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_LOCALE: &str = "en";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: Url,
    pub locale: String,
    pub state_file: PathBuf,
    pub token_lifetime: Duration,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Builds a config with defaults for everything but the API base URL.
    ///
    /// # Errors
    /// Returns `Error::Config` if the URL cannot be parsed or is not http(s).
    pub fn new(api_base_url: &str) -> Result<Self, Error> {
        Ok(Self {
            api_base_url: parse_base_url(api_base_url)?,
            locale: DEFAULT_LOCALE.to_string(),
            state_file: default_state_file(),
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_locale(mut self, locale: &str) -> Self {
        if let Some(locale) = normalize_value(locale) {
            self.locale = locale;
        }
        self
    }

    #[must_use]
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = path;
        self
    }

    #[must_use]
    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        if !lifetime.is_zero() {
            self.token_lifetime = lifetime;
        }
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Joins an API path onto the configured base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        build_url_with_base(self.api_base_url.as_str(), path)
    }
}

/// Default location of the durable session record.
#[must_use]
pub fn default_state_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(env!("CARGO_PKG_NAME"))
        .join("session.json")
}

fn parse_base_url(raw: &str) -> Result<Url, Error> {
    let raw = normalize_value(raw)
        .ok_or_else(|| Error::Config("API base URL is not configured.".to_string()))?;
    let url = Url::parse(&raw)
        .map_err(|err| Error::Config(format!("Invalid API base URL {raw}: {err}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::Config(format!(
            "Unsupported API base URL scheme: {scheme}"
        ))),
    }
}

/// Builds a URL from an explicit base URL and the provided path.
fn build_url_with_base(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_value_trims_and_rejects_empty() {
        assert_eq!(normalize_value(""), None);
        assert_eq!(normalize_value("   "), None);
        assert_eq!(
            normalize_value("  https://api.campus.dev "),
            Some("https://api.campus.dev".to_string())
        );
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let config = ClientConfig::new("https://api.campus.dev/").unwrap();
        assert_eq!(
            config.endpoint("/api/v1/auth/login"),
            "https://api.campus.dev/api/v1/auth/login"
        );

        let config = ClientConfig::new("http://127.0.0.1:9000/backend").unwrap();
        assert_eq!(
            config.endpoint("api/v1/auth/me"),
            "http://127.0.0.1:9000/backend/api/v1/auth/me"
        );
    }

    #[test]
    fn new_rejects_bad_urls() {
        assert!(matches!(ClientConfig::new("  "), Err(Error::Config(_))));
        assert!(matches!(ClientConfig::new("not a url"), Err(Error::Config(_))));
        assert!(matches!(
            ClientConfig::new("ftp://files.campus.dev"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn builders_ignore_empty_values() {
        let config = ClientConfig::new("https://api.campus.dev")
            .unwrap()
            .with_locale("  ")
            .with_token_lifetime(Duration::ZERO);

        assert_eq!(config.locale, DEFAULT_LOCALE);
        assert_eq!(config.token_lifetime, DEFAULT_TOKEN_LIFETIME);

        let config = config
            .with_locale(" es ")
            .with_token_lifetime(Duration::from_secs(60));
        assert_eq!(config.locale, "es");
        assert_eq!(config.token_lifetime, Duration::from_secs(60));
    }

    #[test]
    fn default_state_file_is_scoped_to_the_crate() {
        let path = default_state_file();
        assert!(path.ends_with("campus/session.json"));
    }
}
