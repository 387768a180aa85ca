use crate::cli::actions::{credentials, request, session, Action};
use anyhow::Result;

/// Execute the provided action.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Login(args) => credentials::login(args).await,
        Action::SchoolLogin(args) => credentials::school_login(args).await,
        Action::Register { globals, form } => credentials::register(&globals, &form).await,
        Action::Logout(globals) => session::logout(&globals).await,
        Action::Whoami(globals) => session::whoami(&globals).await,
        Action::Refresh(globals) => session::refresh(&globals).await,
        Action::Get(args) => request::get(args).await,
    }
}
