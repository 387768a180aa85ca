use crate::{
    auth::RegisterForm,
    cli::{
        actions::{credentials, request, Action},
        commands::{self, credentials as args},
        globals::GlobalArgs,
    },
    types::UserType,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

fn globals(matches: &clap::ArgMatches) -> GlobalArgs {
    let mut globals = GlobalArgs::new(matches.get_one::<String>(commands::ARG_API_URL).cloned());

    if let Some(path) = matches.get_one::<String>(commands::ARG_STATE_FILE) {
        globals.state_file = PathBuf::from(path);
    }
    if let Some(locale) = matches.get_one::<String>(commands::ARG_LOCALE) {
        globals.locale.clone_from(locale);
    }
    if let Some(seconds) = matches.get_one::<u64>(commands::ARG_TOKEN_LIFETIME) {
        globals.token_lifetime = Duration::from_secs(*seconds);
    }

    globals
}

fn required(matches: &clap::ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))
}

fn password(matches: &clap::ArgMatches) -> Result<SecretString> {
    required(matches, args::ARG_PASSWORD).map(SecretString::from)
}

fn user_type(matches: &clap::ArgMatches) -> UserType {
    matches
        .get_one::<UserType>(args::ARG_USER_TYPE)
        .copied()
        .unwrap_or(UserType::Student)
}

/// # Errors
/// Returns an error if required arguments are missing or the subcommand is unknown.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let globals = globals(matches);

    match matches.subcommand() {
        Some(("login", sub)) => Ok(Action::Login(credentials::Login {
            globals,
            email: required(sub, args::ARG_EMAIL)?,
            password: password(sub)?,
            user_type: user_type(sub),
        })),
        Some(("school-login", sub)) => Ok(Action::SchoolLogin(credentials::SchoolLogin {
            globals,
            school_code: required(sub, args::ARG_SCHOOL_CODE)?,
            identifier: required(sub, args::ARG_IDENTIFIER)?,
            password: password(sub)?,
            user_type: user_type(sub),
        })),
        Some(("register", sub)) => Ok(Action::Register {
            globals,
            form: RegisterForm {
                email: required(sub, args::ARG_EMAIL)?,
                username: sub
                    .get_one::<String>(args::ARG_USERNAME)
                    .cloned()
                    .unwrap_or_default(),
                password: password(sub)?,
                full_name: sub
                    .get_one::<String>(args::ARG_FULL_NAME)
                    .cloned()
                    .unwrap_or_default(),
                user_type: user_type(sub),
                has_onboarded: sub.get_flag(args::ARG_ONBOARDED),
            },
        }),
        Some(("logout", _)) => Ok(Action::Logout(globals)),
        Some(("whoami", _)) => Ok(Action::Whoami(globals)),
        Some(("refresh", _)) => Ok(Action::Refresh(globals)),
        Some(("get", sub)) => Ok(Action::Get(request::Get {
            globals,
            path: required(sub, commands::ARG_PATH)?,
        })),
        Some((name, _)) => Err(anyhow!("unknown command: {name}")),
        None => Err(anyhow!("missing command")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn dispatch(args: &[&str]) -> Result<Action> {
        let matches = commands::new().try_get_matches_from(args.iter().copied())?;
        handler(&matches)
    }

    #[test]
    fn test_login_action() {
        temp_env::with_vars(
            [
                ("CAMPUS_PASSWORD", Some("secret")),
                ("CAMPUS_LOCALE", None),
                ("CAMPUS_STATE_FILE", None),
            ],
            || {
                let action = dispatch(&[
                    "campus",
                    "--api-url",
                    "http://localhost:8000",
                    "--state-file",
                    "/tmp/s.json",
                    "login",
                    "-e",
                    "a@b.com",
                    "--user-type",
                    "parent",
                ])
                .unwrap();

                let Action::Login(login) = action else {
                    panic!("expected login action");
                };
                assert_eq!(login.email, "a@b.com");
                assert_eq!(login.password.expose_secret(), "secret");
                assert_eq!(login.user_type, UserType::Parent);
                assert_eq!(login.globals.state_file, PathBuf::from("/tmp/s.json"));
                assert_eq!(login.globals.locale, "en");
                assert_eq!(
                    login.globals.api_url.as_deref(),
                    Some("http://localhost:8000")
                );
            },
        );
    }

    #[test]
    fn test_register_action() {
        temp_env::with_vars([("CAMPUS_PASSWORD", None::<&str>)], || {
            let action = dispatch(&[
                "campus",
                "register",
                "-e",
                "new@b.com",
                "--password",
                "pw",
                "--full-name",
                "New Student",
                "--onboarded",
            ])
            .unwrap();

            let Action::Register { form, .. } = action else {
                panic!("expected register action");
            };
            assert_eq!(form.email, "new@b.com");
            assert_eq!(form.username, "");
            assert_eq!(form.full_name, "New Student");
            assert!(form.has_onboarded);
        });
    }

    #[test]
    fn test_session_actions() {
        temp_env::with_vars([("CAMPUS_TOKEN_LIFETIME", Some("90"))], || {
            assert!(matches!(
                dispatch(&["campus", "logout"]).unwrap(),
                Action::Logout(_)
            ));
            assert!(matches!(
                dispatch(&["campus", "refresh"]).unwrap(),
                Action::Refresh(g) if g.token_lifetime == Duration::from_secs(90)
            ));

            let Action::Get(get) = dispatch(&["campus", "get", "/api/v1/me"]).unwrap() else {
                panic!("expected get action");
            };
            assert_eq!(get.path, "/api/v1/me");
        });
    }
}
