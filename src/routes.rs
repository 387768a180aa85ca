//! Client routes. The [`Router`] holds the current path the way a browser
//! location would; the free functions classify paths and build the redirect
//! targets used by the session flows. Paths are locale-prefixed
//! (`/en/dashboard`); a path without a locale prefix uses the configured one.

use regex::Regex;
use std::sync::OnceLock;
use tokio::sync::watch;
use tracing::debug;
use url::form_urlencoded;

/// First segments that belong to the authentication screens.
const AUTH_SEGMENTS: [&str; 6] = [
    "auth",
    "login",
    "register",
    "school-login",
    "forgot-password",
    "reset-password",
];
const LOGIN_SEGMENT: &str = "login";
const LOGOUT_SEGMENT: &str = "logout";
const ONBOARDING_SEGMENT: &str = "onboarding";
const DASHBOARD_SEGMENT: &str = "dashboard";
pub const RETURN_URL_PARAM: &str = "returnUrl";

/// Current location, observable by the guard and the renewal task.
#[derive(Debug)]
pub struct Router {
    current: watch::Sender<String>,
}

impl Router {
    pub fn new(initial: impl Into<String>) -> Self {
        let (current, _) = watch::channel(initial.into());
        Self { current }
    }

    #[must_use]
    pub fn current(&self) -> String {
        self.current.borrow().clone()
    }

    pub fn navigate(&self, path: impl Into<String>) {
        let path = path.into();
        debug!("navigate to {}", path);
        self.current.send_replace(path);
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.current.subscribe()
    }
}

static LOCALE_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// Matches `en`, `es`, `pt-BR` style locale segments.
#[must_use]
pub fn is_locale(segment: &str) -> bool {
    LOCALE_PATTERN
        .get_or_init(|| Regex::new(r"^[a-z]{2}(-[A-Z]{2})?$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(segment))
}

/// Drops query string and fragment.
fn path_only(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or_default()
}

/// Splits `/<locale>/<rest>` into the locale (if any) and the remaining segments.
fn split_locale(path: &str) -> (Option<&str>, Vec<&str>) {
    let mut segments: Vec<&str> = path_only(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    match segments.first() {
        Some(first) if is_locale(first) => {
            let locale = segments.remove(0);
            (Some(locale), segments)
        }
        _ => (None, segments),
    }
}

/// Locale of a path, falling back to `default`.
#[must_use]
pub fn locale_of(path: &str, default: &str) -> String {
    split_locale(path).0.unwrap_or(default).to_string()
}

fn first_segment(path: &str) -> Option<String> {
    split_locale(path).1.first().map(|s| (*s).to_string())
}

/// `/` or `/<locale>`.
#[must_use]
pub fn is_landing(path: &str) -> bool {
    split_locale(path).1.is_empty()
}

#[must_use]
pub fn is_auth_path(path: &str) -> bool {
    first_segment(path).is_some_and(|segment| AUTH_SEGMENTS.contains(&segment.as_str()))
}

#[must_use]
pub fn is_login(path: &str) -> bool {
    let (_, segments) = split_locale(path);
    match segments.as_slice() {
        [LOGIN_SEGMENT, ..] => true,
        ["auth", LOGIN_SEGMENT, ..] => true,
        _ => false,
    }
}

#[must_use]
pub fn is_logout(path: &str) -> bool {
    first_segment(path).is_some_and(|segment| segment == LOGOUT_SEGMENT)
}

#[must_use]
pub fn is_onboarding(path: &str) -> bool {
    first_segment(path).is_some_and(|segment| segment == ONBOARDING_SEGMENT)
}

/// Public routes are requested without credentials and never trigger a refresh.
#[must_use]
pub fn is_public(path: &str) -> bool {
    is_landing(path) || is_auth_path(path)
}

#[must_use]
pub fn locale_root(locale: &str) -> String {
    format!("/{locale}")
}

#[must_use]
pub fn dashboard_path(locale: &str) -> String {
    format!("/{locale}/{DASHBOARD_SEGMENT}")
}

#[must_use]
pub fn onboarding_path(locale: &str) -> String {
    format!("/{locale}/{ONBOARDING_SEGMENT}")
}

/// Login route, optionally carrying the page to come back to.
#[must_use]
pub fn login_path(locale: &str, return_to: Option<&str>) -> String {
    let base = format!("/{locale}/{LOGIN_SEGMENT}");
    match return_to.filter(|path| !path.trim().is_empty()) {
        Some(path) => {
            let encoded: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
            format!("{base}?{RETURN_URL_PARAM}={encoded}")
        }
        None => base,
    }
}

/// Reads the `returnUrl` parameter back from a login route.
#[must_use]
pub fn return_url(path: &str) -> Option<String> {
    let (_, query) = path.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == RETURN_URL_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| value.starts_with('/') && !value.starts_with("//"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_detection() {
        assert!(is_locale("en"));
        assert!(is_locale("pt-BR"));
        assert!(!is_locale("dashboard"));
        assert!(!is_locale("EN"));
        assert_eq!(locale_of("/es/courses", "en"), "es");
        assert_eq!(locale_of("/courses", "en"), "en");
        assert_eq!(locale_of("/", "fr"), "fr");
    }

    #[test]
    fn locale_pattern_is_compiled_once() {
        assert!(is_locale("es"));
        let first = LOCALE_PATTERN.get().and_then(Option::as_ref).map(std::ptr::from_ref);
        assert!(first.is_some());
        for _ in 0..100 {
            assert!(is_locale("pt-BR"));
            assert!(!is_locale("courses"));
        }
        let again = LOCALE_PATTERN.get().and_then(Option::as_ref).map(std::ptr::from_ref);
        assert_eq!(first, again);
    }

    #[test]
    fn public_routes() {
        for path in [
            "/",
            "/en",
            "/en/",
            "/en?ref=ad",
            "/en/login",
            "/en/register",
            "/en/school-login",
            "/en/auth/callback",
            "/login?returnUrl=%2Fen%2Fdashboard",
        ] {
            assert!(is_public(path), "{path} should be public");
        }

        for path in ["/en/dashboard", "/en/onboarding", "/en/logout", "/en/loginx"] {
            assert!(!is_public(path), "{path} should be protected");
        }
    }

    #[test]
    fn special_routes() {
        assert!(is_login("/en/login"));
        assert!(is_login("/en/auth/login?returnUrl=%2Fen"));
        assert!(!is_login("/en/register"));
        assert!(is_logout("/en/logout"));
        assert!(is_onboarding("/en/onboarding/step-2"));
        assert!(!is_onboarding("/en/dashboard/onboarding"));
    }

    #[test]
    fn login_path_round_trips_return_url() {
        let path = login_path("en", Some("/en/courses/7?tab=grades"));
        assert_eq!(
            path,
            "/en/login?returnUrl=%2Fen%2Fcourses%2F7%3Ftab%3Dgrades"
        );
        assert_eq!(
            return_url(&path).as_deref(),
            Some("/en/courses/7?tab=grades")
        );
        assert_eq!(login_path("es", None), "/es/login");
        assert_eq!(login_path("es", Some("  ")), "/es/login");
    }

    #[test]
    fn return_url_must_be_local() {
        assert_eq!(return_url("/en/login?returnUrl=https%3A%2F%2Fevil.example"), None);
        assert_eq!(return_url("/en/login?returnUrl=%2F%2Fevil.example"), None);
        assert_eq!(return_url("/en/login"), None);
    }

    #[test]
    fn router_notifies_subscribers() {
        let router = Router::new("/en");
        let mut rx = router.subscribe();

        router.navigate("/en/dashboard");

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "/en/dashboard");
        assert_eq!(router.current(), "/en/dashboard");
    }
}
