use crate::{
    auth::Auth,
    config::{default_state_file, ClientConfig},
    storage::FileStore,
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub api_url: Option<String>,
    pub state_file: PathBuf,
    pub locale: String,
    pub token_lifetime: Duration,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(api_url: Option<String>) -> Self {
        Self {
            api_url,
            state_file: default_state_file(),
            locale: crate::config::DEFAULT_LOCALE.to_string(),
            token_lifetime: crate::config::DEFAULT_TOKEN_LIFETIME,
        }
    }

    /// # Errors
    /// Returns an error if the API URL is missing or invalid.
    pub fn config(&self) -> Result<ClientConfig> {
        let api_url = self
            .api_url
            .as_deref()
            .context("missing required argument: --api-url (or CAMPUS_API_URL)")?;

        Ok(ClientConfig::new(api_url)?
            .with_locale(&self.locale)
            .with_state_file(self.state_file.clone())
            .with_token_lifetime(self.token_lifetime))
    }

    /// Builds a session controller backed by the state file, starting at `initial_path`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn session(&self, initial_path: &str) -> Result<Auth> {
        let config = self.config()?;
        let backend = Arc::new(FileStore::new(config.state_file.clone()));
        Ok(Auth::new(config, backend, initial_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(None);
        assert_eq!(args.locale, "en");
        assert_eq!(args.token_lifetime, Duration::from_secs(1800));
        assert!(args.state_file.ends_with("campus/session.json"));
        assert!(args.config().is_err());
    }

    #[test]
    fn test_config_from_globals() {
        let args = GlobalArgs {
            locale: "es".to_string(),
            state_file: PathBuf::from("/tmp/campus-test.json"),
            ..GlobalArgs::new(Some("https://api.campus.tld/".to_string()))
        };

        let config = args.config().unwrap();
        assert_eq!(config.locale, "es");
        assert_eq!(config.state_file, PathBuf::from("/tmp/campus-test.json"));
        assert_eq!(
            config.endpoint("/api/v1/auth/me"),
            "https://api.campus.tld/api/v1/auth/me"
        );
    }
}
