use crate::{
    auth::{Auth, RegisterForm},
    cli::globals::GlobalArgs,
    routes,
    types::UserType,
};
use anyhow::{anyhow, Result};
use secrecy::SecretString;
use tracing::debug;

#[derive(Debug)]
pub struct Login {
    pub globals: GlobalArgs,
    pub email: String,
    pub password: SecretString,
    pub user_type: UserType,
}

#[derive(Debug)]
pub struct SchoolLogin {
    pub globals: GlobalArgs,
    pub school_code: String,
    pub identifier: String,
    pub password: SecretString,
    pub user_type: UserType,
}

fn login_session(globals: &GlobalArgs) -> Result<Auth> {
    globals.session(&routes::login_path(&globals.locale, None))
}

/// Turns the outcome of a credential flow into CLI output.
fn report(auth: &Auth, ok: bool) -> Result<()> {
    if !ok {
        let message = auth
            .error()
            .unwrap_or_else(|| crate::auth::LOGIN_FAILED.to_string());
        return Err(anyhow!(message));
    }

    let name = auth
        .user()
        .map(|user| {
            user.full_name
                .or(user.username)
                .filter(|name| !name.is_empty())
                .unwrap_or(user.email)
        })
        .unwrap_or_default();

    println!("Logged in as {name}");
    println!("Next: {}", auth.router().current());

    Ok(())
}

/// # Errors
/// Returns an error if the configuration is invalid or the credentials are rejected.
pub async fn login(args: Login) -> Result<()> {
    let auth = login_session(&args.globals)?;
    debug!(email = %args.email, user_type = %args.user_type, "logging in");

    let ok = auth
        .login(&args.email, &args.password, args.user_type)
        .await;
    report(&auth, ok)
}

/// # Errors
/// Returns an error if the configuration is invalid or the credentials are rejected.
pub async fn school_login(args: SchoolLogin) -> Result<()> {
    let auth = login_session(&args.globals)?;
    debug!(school_code = %args.school_code, "logging in through school");

    let ok = auth
        .login_school(
            &args.school_code,
            &args.identifier,
            &args.password,
            args.user_type,
        )
        .await;
    report(&auth, ok)
}

/// # Errors
/// Returns an error if the configuration is invalid, registration fails or the
/// follow-up login fails.
pub async fn register(globals: &GlobalArgs, form: &RegisterForm) -> Result<()> {
    let auth = globals.session(&routes::locale_root(&globals.locale))?;

    let ok = auth.register(form).await;
    report(&auth, ok)
}
