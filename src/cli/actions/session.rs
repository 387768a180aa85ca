use crate::{cli::globals::GlobalArgs, routes};
use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

/// # Errors
/// Returns an error if the configuration is invalid.
pub async fn logout(globals: &GlobalArgs) -> Result<()> {
    let auth = globals.session(&routes::dashboard_path(&globals.locale))?;
    // an unreadable record is still cleared below
    if let Err(e) = auth.store().hydrate() {
        warn!("Failed to read stored session: {}", e);
    }

    let had_session = auth.store().is_authenticated();
    auth.logout().await;

    if had_session {
        println!("Logged out");
    } else {
        println!("No active session");
    }

    Ok(())
}

/// Validates the stored session against the API and prints the user as JSON.
///
/// # Errors
/// Returns an error if there is no valid session.
pub async fn whoami(globals: &GlobalArgs) -> Result<()> {
    let auth = globals.session(&routes::dashboard_path(&globals.locale))?;

    if !auth.bootstrap().await {
        return Err(anyhow!("not logged in"));
    }

    let user = auth.user().context("session has no user record")?;
    println!("{}", serde_json::to_string_pretty(&user)?);

    let route = auth.router().current();
    if routes::is_onboarding(&route) {
        println!("Onboarding pending: {route}");
    }

    Ok(())
}

/// # Errors
/// Returns an error if there is no refresh token or the API rejects it.
pub async fn refresh(globals: &GlobalArgs) -> Result<()> {
    let auth = globals.session(&routes::dashboard_path(&globals.locale))?;
    auth.store()
        .hydrate()
        .context("failed to read stored session")?;

    if auth.store().refresh_token().is_none() {
        return Err(anyhow!("not logged in"));
    }

    debug!("refreshing access token");
    if auth.client().refresher().refresh().await {
        println!("Access token refreshed");
        Ok(())
    } else {
        Err(anyhow!("token refresh failed, log in again"))
    }
}
