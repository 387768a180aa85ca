pub mod credentials;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_STATE_FILE: &str = "state-file";
pub const ARG_LOCALE: &str = "locale";
pub const ARG_TOKEN_LIFETIME: &str = "token-lifetime";
pub const ARG_PATH: &str = "path";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("campus")
        .about("Campus session client")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_API_URL)
                .long("api-url")
                .help("Campus API base URL, example: https://api.campus.tld")
                .env("CAMPUS_API_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_STATE_FILE)
                .long("state-file")
                .help("Where the session record is stored (default: <data dir>/campus/session.json)")
                .env("CAMPUS_STATE_FILE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_LOCALE)
                .long("locale")
                .help("Default locale used for routes")
                .default_value(crate::config::DEFAULT_LOCALE)
                .env("CAMPUS_LOCALE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_LIFETIME)
                .long("token-lifetime")
                .help("Access token lifetime in seconds, drives background renewal")
                .default_value("1800")
                .env("CAMPUS_TOKEN_LIFETIME")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .subcommand(credentials::login())
        .subcommand(credentials::school_login())
        .subcommand(credentials::register())
        .subcommand(Command::new("logout").about("End the session and forget stored credentials"))
        .subcommand(Command::new("whoami").about("Validate the stored session and print the user"))
        .subcommand(Command::new("refresh").about("Exchange the refresh token for a new access token"))
        .subcommand(
            Command::new("get")
                .about("Authenticated GET against the API")
                .arg(
                    Arg::new(ARG_PATH)
                        .help("API path, example: /api/v1/courses")
                        .required(true),
                ),
        );

    logging::with_args(command)
}
