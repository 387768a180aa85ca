//! Token Refresher. Exchanges the stored refresh token for a new access token,
//! on demand (after a 401) and on a background interval.
//!
//! Concurrent refresh attempts are coalesced: callers queue on an async mutex
//! and a caller that finds a different access token in storage than the one
//! that failed for it returns success without another network call.
//!
//! Failure never clears the session here; the caller decides.

use crate::{
    error::Error,
    routes::{self, Router},
    session::SessionStore,
    types::{error_detail, RefreshRequest, RefreshResponse},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{sleep, Duration},
};
use tracing::{debug, error, info, instrument, warn};

pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

/// Attempts per renewal tick before waiting for the next one.
const RENEW_ATTEMPTS: u32 = 3;

#[derive(Debug)]
pub struct TokenRefresher {
    http: reqwest::Client,
    endpoint: String,
    store: Arc<SessionStore>,
    in_flight: Mutex<()>,
}

impl TokenRefresher {
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: String, store: Arc<SessionStore>) -> Self {
        Self {
            http,
            endpoint,
            store,
            in_flight: Mutex::new(()),
        }
    }

    /// Refreshes unconditionally. Returns `true` when a new access token was stored.
    pub async fn refresh(&self) -> bool {
        let _in_flight = self.in_flight.lock().await;
        self.refresh_locked().await
    }

    /// Refreshes after `failed` was rejected by the API, unless another caller
    /// already replaced it while this one was waiting.
    pub async fn refresh_after(&self, failed: Option<&SecretString>) -> bool {
        let _in_flight = self.in_flight.lock().await;

        if let Some(failed) = failed {
            match self.store.storage().access_token() {
                Ok(Some(current)) if current.expose_secret() != failed.expose_secret() => {
                    debug!("access token already refreshed by a concurrent request");
                    return true;
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to read stored access token: {}", e),
            }
        }

        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> bool {
        match self.exchange().await {
            Ok(true) => true,
            Ok(false) => {
                debug!("no refresh token stored; skipping refresh");
                false
            }
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                false
            }
        }
    }

    #[instrument(skip(self))]
    async fn exchange(&self) -> Result<bool, Error> {
        // durable copy, the in-memory one may be stale
        let Some(refresh_token) = self.store.storage().refresh_token()? else {
            return Ok(false);
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                message: error_detail(&body).unwrap_or_else(|| "Refresh rejected.".to_string()),
            });
        }

        let refreshed = RefreshResponse::parse(&body)?;
        self.store
            .set_access_token(&SecretString::from(refreshed.access_token))?;

        if let Err(e) = self.store.sync_user_from_storage() {
            warn!("Failed to re-sync user after refresh: {}", e);
        }

        info!("access token refreshed");

        Ok(true)
    }

    /// Starts proactive renewal at 70-90% of `lifetime`. The task idles while
    /// no refresh token is stored or the router sits on the landing page.
    #[must_use]
    pub fn spawn_renewal(self: &Arc<Self>, router: Arc<Router>, lifetime: Duration) -> RenewalHandle {
        let refresher = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();

            loop {
                let period = renewal_period(lifetime, rng.gen_range(70..90));
                debug!("Will renew access token in {} ms", period.as_millis());
                sleep(period).await;

                let has_refresh_token = matches!(
                    refresher.store.storage().refresh_token(),
                    Ok(Some(_))
                );
                if !has_refresh_token || routes::is_landing(&router.current()) {
                    continue;
                }

                for attempt in 1..=RENEW_ATTEMPTS {
                    let backoff_time = 2u64.pow(attempt - 1);

                    if attempt > 1 {
                        warn!("Backing off for {} seconds", backoff_time);
                        sleep(Duration::from_secs(backoff_time)).await;
                    }

                    if refresher.refresh().await {
                        break;
                    }

                    if attempt == RENEW_ATTEMPTS {
                        error!(
                            "Failed to renew access token after {} attempts",
                            RENEW_ATTEMPTS
                        );
                    }
                }
            }
        });

        RenewalHandle { handle }
    }
}

/// Background renewal task; stops when dropped.
#[derive(Debug)]
pub struct RenewalHandle {
    handle: JoinHandle<()>,
}

impl RenewalHandle {
    pub fn stop(self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// `factor` percent of `lifetime`, saturating instead of overflowing on huge lifetimes.
fn renewal_period(lifetime: Duration, factor: u32) -> Duration {
    lifetime
        .checked_mul(factor)
        .map_or_else(|| lifetime / 100 * factor.min(100), |scaled| scaled / 100)
}
