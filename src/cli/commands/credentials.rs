use clap::{Arg, ArgAction, Command};

pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_USER_TYPE: &str = "user-type";
pub const ARG_SCHOOL_CODE: &str = "school-code";
pub const ARG_IDENTIFIER: &str = "identifier";
pub const ARG_USERNAME: &str = "username";
pub const ARG_FULL_NAME: &str = "full-name";
pub const ARG_ONBOARDED: &str = "onboarded";

fn password() -> Arg {
    Arg::new(ARG_PASSWORD)
        .long("password")
        .help("Account password")
        .env("CAMPUS_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

fn user_type(default: &'static str) -> Arg {
    Arg::new(ARG_USER_TYPE)
        .long("user-type")
        .help("student, parent, school_student, school_professor, school_admin")
        .default_value(default)
        .value_parser(|value: &str| value.parse::<crate::types::UserType>())
}

#[must_use]
pub fn login() -> Command {
    Command::new("login")
        .about("Log in with email and password")
        .arg(
            Arg::new(ARG_EMAIL)
                .short('e')
                .long("email")
                .help("Account email")
                .env("CAMPUS_EMAIL")
                .required(true),
        )
        .arg(password())
        .arg(user_type("student"))
}

#[must_use]
pub fn school_login() -> Command {
    Command::new("school-login")
        .about("Log in through a school with a school code")
        .arg(
            Arg::new(ARG_SCHOOL_CODE)
                .short('s')
                .long("school-code")
                .help("School code handed out by the school")
                .env("CAMPUS_SCHOOL_CODE")
                .required(true),
        )
        .arg(
            Arg::new(ARG_IDENTIFIER)
                .short('i')
                .long("identifier")
                .help("Student number, email or username within the school")
                .required(true),
        )
        .arg(password())
        .arg(user_type("school_student"))
}

#[must_use]
pub fn register() -> Command {
    Command::new("register")
        .about("Create an account, then log in")
        .arg(
            Arg::new(ARG_EMAIL)
                .short('e')
                .long("email")
                .help("Account email")
                .env("CAMPUS_EMAIL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_USERNAME)
                .short('u')
                .long("username")
                .help("Username (default: the part of the email before @)"),
        )
        .arg(
            Arg::new(ARG_FULL_NAME)
                .long("full-name")
                .help("Full name")
                .default_value(""),
        )
        .arg(password())
        .arg(user_type("student"))
        .arg(
            Arg::new(ARG_ONBOARDED)
                .long("onboarded")
                .help("Skip onboarding for the new account")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use crate::{cli::commands, types::UserType};

    use super::*;

    #[test]
    fn test_login_args() {
        temp_env::with_vars([("CAMPUS_PASSWORD", Some("hunter2"))], || {
            let matches = commands::new().get_matches_from(vec![
                "campus",
                "--api-url",
                "http://localhost:8000",
                "login",
                "--email",
                "a@b.com",
            ]);

            let (name, sub) = matches.subcommand().unwrap();
            assert_eq!(name, "login");
            assert_eq!(
                sub.get_one::<String>(ARG_EMAIL).cloned(),
                Some("a@b.com".to_string())
            );
            assert_eq!(
                sub.get_one::<String>(ARG_PASSWORD).cloned(),
                Some("hunter2".to_string())
            );
            assert_eq!(
                sub.get_one::<UserType>(ARG_USER_TYPE).copied(),
                Some(UserType::Student)
            );
        });
    }

    #[test]
    fn test_school_login_args() {
        temp_env::with_vars([("CAMPUS_PASSWORD", None::<&str>)], || {
            let matches = commands::new().get_matches_from(vec![
                "campus",
                "school-login",
                "--school-code",
                "SC1",
                "--identifier",
                "s001",
                "--password",
                "x",
            ]);

            let (_, sub) = matches.subcommand().unwrap();
            assert_eq!(
                sub.get_one::<String>(ARG_SCHOOL_CODE).cloned(),
                Some("SC1".to_string())
            );
            assert_eq!(
                sub.get_one::<UserType>(ARG_USER_TYPE).copied(),
                Some(UserType::SchoolStudent)
            );
        });
    }

    #[test]
    fn test_password_is_required() {
        temp_env::with_vars([("CAMPUS_PASSWORD", None::<&str>)], || {
            let result =
                commands::new().try_get_matches_from(vec!["campus", "login", "-e", "a@b.com"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_rejects_unknown_user_type() {
        let result = commands::new().try_get_matches_from(vec![
            "campus",
            "login",
            "-e",
            "a@b.com",
            "--password",
            "x",
            "--user-type",
            "janitor",
        ]);
        assert!(result.is_err());
    }
}
