use crate::{
    cli::globals::GlobalArgs,
    client::ApiRequest,
    routes,
};
use anyhow::{anyhow, Context, Result};

#[derive(Debug)]
pub struct Get {
    pub globals: GlobalArgs,
    pub path: String,
}

/// Authenticated GET; prints the response body to stdout.
///
/// # Errors
/// Returns an error if the server cannot be reached or answers with a non-2xx status.
pub async fn get(args: Get) -> Result<()> {
    let auth = args
        .globals
        .session(&routes::dashboard_path(&args.globals.locale))?;
    auth.store()
        .hydrate()
        .context("failed to read stored session")?;

    let response = auth.client().send(&ApiRequest::get(&args.path)).await?;
    let status = response.status();
    let body = response.text().await?;

    if !body.is_empty() {
        println!("{body}");
    }

    if status.is_success() {
        return Ok(());
    }

    if routes::is_login(&auth.router().current()) {
        Err(anyhow!("session expired ({status}), log in again"))
    } else {
        Err(anyhow!("request failed: {status}"))
    }
}
