//! Route Guard. UX-only gate; real access control lives on the API.
//!
//! Two rules, evaluated on every user change and every navigation:
//! an anonymous visitor on a protected route goes to login (remembering where
//! they were), and a user that has not onboarded is confined to the
//! onboarding routes, logout, auth screens and the landing page.

use crate::{
    routes::{self, Router},
    session::{SessionSnapshot, SessionStore},
    storage::AuthKind,
    types::{User, UserType},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Redirect {
    /// No session on a protected route; carries the path to come back to.
    Login { target: String, return_to: String },
    Onboarding { target: String },
}

impl Redirect {
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Login { target, .. } | Self::Onboarding { target } => target,
        }
    }
}

/// Onboarding gate on its own: `Some(target)` when `user` must be sent to onboarding.
/// School accounts are provisioned by their school and are never gated.
#[must_use]
pub fn onboarding_redirect(user: Option<&User>, path: &str, default_locale: &str) -> Option<String> {
    let user = user?;
    if user.has_onboarded || user.user_type.is_some_and(UserType::is_school) {
        return None;
    }

    let allowed = routes::is_onboarding(path)
        || routes::is_logout(path)
        || routes::is_auth_path(path)
        || routes::is_landing(path);

    if allowed {
        None
    } else {
        Some(routes::onboarding_path(&routes::locale_of(path, default_locale)))
    }
}

/// Full guard decision for the given session state and path.
#[must_use]
pub fn evaluate(snapshot: &SessionSnapshot, path: &str, default_locale: &str) -> Option<Redirect> {
    if routes::is_public(path) {
        return None;
    }

    if !snapshot.authenticated && snapshot.user.is_none() {
        let locale = routes::locale_of(path, default_locale);
        return Some(Redirect::Login {
            target: routes::login_path(&locale, Some(path)),
            return_to: path.to_string(),
        });
    }

    if snapshot.auth_kind == Some(AuthKind::School) {
        return None;
    }

    onboarding_redirect(snapshot.user.as_ref(), path, default_locale)
        .map(|target| Redirect::Onboarding { target })
}

/// Evaluates the guard once and performs the redirect, if any.
pub fn enforce(store: &SessionStore, router: &Router, default_locale: &str) -> Option<Redirect> {
    let path = router.current();
    let redirect = evaluate(&store.snapshot(), &path, default_locale)?;

    if let Redirect::Login { return_to, .. } = &redirect {
        if let Err(e) = store.storage().set_redirect_intent(return_to) {
            warn!("Failed to store redirect intent: {}", e);
        }
    }

    debug!(from = %path, to = %redirect.target(), "guard redirect");
    router.navigate(redirect.target());

    Some(redirect)
}

/// Runs the guard as a reactive effect until the returned task is aborted.
#[must_use]
pub fn spawn_guard(
    store: Arc<SessionStore>,
    router: Arc<Router>,
    default_locale: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sessions = store.subscribe();
        let mut locations = router.subscribe();

        loop {
            sessions.borrow_and_update();
            locations.borrow_and_update();

            enforce(&store, &router, &default_locale);

            tokio::select! {
                changed = sessions.changed() => if changed.is_err() { break },
                changed = locations.changed() => if changed.is_err() { break },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AuthStorage, MemoryStore};
    use secrecy::SecretString;
    use serde_json::json;
    use tokio::time::{sleep, Duration};

    fn user(onboarded: bool) -> User {
        serde_json::from_value(json!({"id": 5, "has_onboarded": onboarded})).unwrap()
    }

    fn signed_in(onboarded: bool) -> SessionSnapshot {
        SessionSnapshot {
            user: Some(user(onboarded)),
            authenticated: true,
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn onboarding_gate_confines_new_users() {
        let new_user = user(false);
        for path in ["/en/dashboard", "/en/courses/3", "/en/messages?tab=inbox"] {
            assert_eq!(
                onboarding_redirect(Some(&new_user), path, "en").as_deref(),
                Some("/en/onboarding"),
                "{path}"
            );
        }
        assert_eq!(
            onboarding_redirect(Some(&new_user), "/es/schedule", "en").as_deref(),
            Some("/es/onboarding")
        );

        for path in ["/en/onboarding", "/en/onboarding/profile", "/en/logout", "/en/login", "/en"] {
            assert_eq!(onboarding_redirect(Some(&new_user), path, "en"), None, "{path}");
        }
    }

    #[test]
    fn onboarded_users_are_never_redirected() {
        let snapshot = signed_in(true);
        for path in ["/en/dashboard", "/en/onboarding", "/en/logout", "/en/courses/1", "/"] {
            assert_eq!(evaluate(&snapshot, path, "en"), None, "{path}");
        }
    }

    #[test]
    fn school_accounts_skip_onboarding() {
        let school_user: User = serde_json::from_value(
            json!({"id": 8, "user_type": "school_professor", "has_onboarded": false}),
        )
        .unwrap();
        assert_eq!(
            onboarding_redirect(Some(&school_user), "/en/dashboard", "en"),
            None
        );

        // the user record may lack a type; the session kind still exempts it
        let snapshot = SessionSnapshot {
            auth_kind: Some(AuthKind::School),
            ..signed_in(false)
        };
        assert_eq!(evaluate(&snapshot, "/en/courses/2", "en"), None);

        let regular = SessionSnapshot {
            auth_kind: Some(AuthKind::Regular),
            ..signed_in(false)
        };
        assert!(matches!(
            evaluate(&regular, "/en/courses/2", "en"),
            Some(Redirect::Onboarding { .. })
        ));
    }

    #[test]
    fn anonymous_visitors_go_to_login() {
        let redirect = evaluate(&SessionSnapshot::default(), "/en/courses/3", "en");
        assert_eq!(
            redirect,
            Some(Redirect::Login {
                target: "/en/login?returnUrl=%2Fen%2Fcourses%2F3".to_string(),
                return_to: "/en/courses/3".to_string(),
            })
        );

        assert_eq!(evaluate(&SessionSnapshot::default(), "/en/register", "en"), None);
        assert_eq!(evaluate(&SessionSnapshot::default(), "/", "en"), None);
    }

    #[test]
    fn enforce_records_redirect_intent() {
        let store = SessionStore::new(AuthStorage::new(Arc::new(MemoryStore::default())));
        let router = Router::new("/en/grades");

        let redirect = enforce(&store, &router, "en");

        assert!(matches!(redirect, Some(Redirect::Login { .. })));
        assert_eq!(router.current(), "/en/login?returnUrl=%2Fen%2Fgrades");
        assert_eq!(
            store.storage().redirect_intent().unwrap().as_deref(),
            Some("/en/grades")
        );
    }

    #[tokio::test]
    async fn spawned_guard_reacts_to_user_changes() {
        let store = Arc::new(SessionStore::new(AuthStorage::new(Arc::new(
            MemoryStore::default(),
        ))));
        let router = Arc::new(Router::new("/en/dashboard"));
        store
            .replace(
                &SecretString::from("AT".to_string()),
                &SecretString::from("RT".to_string()),
                user(true),
                AuthKind::Regular,
                None,
            )
            .unwrap();

        let guard = spawn_guard(store.clone(), router.clone(), "en".to_string());
        sleep(Duration::from_millis(20)).await;
        assert_eq!(router.current(), "/en/dashboard");

        store.set_user(user(false)).unwrap();

        let mut redirected = false;
        for _ in 0..50 {
            sleep(Duration::from_millis(10)).await;
            if router.current() == "/en/onboarding" {
                redirected = true;
                break;
            }
        }
        guard.abort();

        assert!(redirected, "guard should have moved the user to onboarding");
    }
}
