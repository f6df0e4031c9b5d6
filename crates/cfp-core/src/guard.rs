//! Navigation guard: which entry points a session may reach.

use std::fmt;

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    /// Landing page after the backend's verification link.
    EmailVerified,
    Dashboard,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::EmailVerified => "/email-verified",
            Route::Dashboard => "/",
        }
    }

    pub fn guest_only(self) -> bool {
        matches!(self, Route::Login | Route::Register)
    }

    pub fn auth_only(self) -> bool {
        matches!(self, Route::Dashboard)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Outcome of a navigation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(Route),
}

/// Decides whether `session` may enter `route`.
///
/// Expects a bootstrapped session; call [`crate::app::App::navigate`] to get
/// that for free.
pub fn guard(route: Route, session: &Session) -> Navigation {
    if route.auth_only() && !session.is_logged_in() {
        return Navigation::Redirect(Route::Login);
    }
    if route.guest_only() && session.is_logged_in() {
        return Navigation::Redirect(Route::Dashboard);
    }
    Navigation::Allow
}
