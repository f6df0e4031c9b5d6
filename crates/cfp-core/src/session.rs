//! Auth session store.
//!
//! Holds the token, the identity behind it and the email verification
//! flags. Only the token is persisted; the rest is re-fetched by
//! [`AuthStore::bootstrap`] once per process.

use std::sync::Arc;

use anyhow::Result;
use cfp_types::{AuthTokenResponse, MeResponse, Registration, User};
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::error::{ApiError, error_message};
use crate::http::ApiClient;
use crate::storage::TokenStorage;

/// Holds a `loading` flag up for as long as it lives, so the flag drops
/// back even when the request future is cancelled.
pub(crate) struct LoadingGuard<'a>(&'a mut bool);

impl<'a> LoadingGuard<'a> {
    pub(crate) fn start(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// Client-held record of the current identity.
///
/// `user` is only set once the token has been validated (by bootstrap,
/// login or register); a token loaded from storage starts without a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<User>,
    pub must_verify_email: bool,
    pub email_verified: bool,
    pub bootstrapped: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            token: None,
            user: None,
            must_verify_email: true,
            email_verified: false,
            bootstrapped: false,
        }
    }
}

impl Session {
    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    pub fn needs_email_verification(&self) -> bool {
        self.must_verify_email && !self.email_verified
    }

    pub fn user_id(&self) -> Option<u64> {
        self.user.as_ref().map(|user| user.id).filter(|id| *id != 0)
    }
}

/// Owner of the [`Session`] and the only writer of the persisted token.
pub struct AuthStore {
    api: AuthApi,
    storage: Arc<dyn TokenStorage>,
    session: Session,
    loading: bool,
    last_error: Option<ApiError>,
}

impl AuthStore {
    /// Creates the store, seeding the token from the client's storage.
    pub fn new(client: &ApiClient) -> Self {
        let storage = Arc::clone(client.storage());
        let token = match storage.load() {
            Ok(token) => token,
            Err(err) => {
                warn!("ignoring unreadable stored token: {err:#}");
                None
            }
        };

        Self {
            api: AuthApi::new(client.clone()),
            storage,
            session: Session {
                token,
                ..Session::default()
            },
            loading: false,
            last_error: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn user(&self) -> Option<&User> {
        self.session.user.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_logged_in()
    }

    pub fn needs_email_verification(&self) -> bool {
        self.session.needs_email_verification()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    /// Validates the persisted token once per process.
    ///
    /// Later calls return immediately. Without a token no request is made.
    /// Any failure (rejected token, transport error, malformed body) clears
    /// the whole session; there is no retry.
    pub async fn bootstrap(&mut self) {
        if self.session.bootstrapped {
            return;
        }
        // Set before the request so a second caller cannot start another one.
        self.session.bootstrapped = true;

        if self.session.token.is_none() {
            return;
        }

        let result = {
            let _loading = LoadingGuard::start(&mut self.loading);
            self.api.me().await
        };

        match result {
            Ok(me) => self.apply_me(me),
            Err(err) => {
                debug!("session validation failed: {err:#}");
                self.clear_auth();
            }
        }
    }

    /// # Errors
    /// Returns the normalized [`ApiError`]; the same value is kept in
    /// [`AuthStore::last_error`].
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), ApiError> {
        self.last_error = None;
        let result = {
            let _loading = LoadingGuard::start(&mut self.loading);
            self.api.login(email, password).await
        };
        self.finish_auth(result)
    }

    /// # Errors
    /// Returns the normalized [`ApiError`]; the same value is kept in
    /// [`AuthStore::last_error`].
    pub async fn register(&mut self, registration: &Registration) -> Result<(), ApiError> {
        self.last_error = None;
        let result = {
            let _loading = LoadingGuard::start(&mut self.loading);
            self.api.register(registration).await
        };
        self.finish_auth(result)
    }

    /// Asks the backend to send another verification email. Session state
    /// is untouched; only `last_error` changes on failure.
    ///
    /// # Errors
    /// Returns the normalized [`ApiError`].
    pub async fn resend_verification(&mut self) -> Result<(), ApiError> {
        self.last_error = None;
        match self.api.resend_verification().await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.record_error(&err)),
        }
    }

    /// Best-effort remote logout followed by an unconditional local clear.
    pub async fn logout(&mut self) {
        self.last_error = None;
        if self.session.token.is_some()
            && let Err(err) = self.api.logout().await
        {
            debug!("remote logout failed, clearing locally anyway: {err:#}");
        }
        self.clear_auth();
    }

    /// Resets the session and removes the persisted token.
    pub fn clear_auth(&mut self) {
        let bootstrapped = self.session.bootstrapped;
        self.session = Session {
            bootstrapped,
            ..Session::default()
        };
        if let Err(err) = self.storage.clear() {
            warn!("failed to remove stored token: {err:#}");
        }
    }

    fn set_auth(&mut self, response: AuthTokenResponse) {
        if let Err(err) = self.storage.save(&response.token) {
            warn!("failed to persist session token: {err:#}");
        }
        info!(user_id = response.user.id, "signed in");
        self.session.token = Some(response.token);
        self.session.user = Some(response.user);
        self.session.must_verify_email = response.must_verify_email;
        self.session.email_verified = response.email_verified;
    }

    fn apply_me(&mut self, me: MeResponse) {
        self.session.user = Some(me.user);
        self.session.must_verify_email = me.must_verify_email;
        self.session.email_verified = me.email_verified;
    }

    fn finish_auth(&mut self, result: Result<AuthTokenResponse>) -> Result<(), ApiError> {
        match result {
            Ok(response) => {
                self.set_auth(response);
                Ok(())
            }
            Err(err) => Err(self.record_error(&err)),
        }
    }

    fn record_error(&mut self, err: &anyhow::Error) -> ApiError {
        let normalized = err
            .downcast_ref::<ApiError>()
            .cloned()
            .unwrap_or_else(|| ApiError::new(None, error_message(err, "Request failed")));
        self.last_error = Some(normalized.clone());
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults_require_verification() {
        let session = Session::default();
        assert!(!session.is_logged_in());
        assert!(session.needs_email_verification());
        assert!(!session.bootstrapped);
    }

    #[test]
    fn test_user_id_ignores_zero() {
        let mut session = Session::default();
        assert_eq!(session.user_id(), None);
        session.user = Some(User {
            id: 0,
            name: "n".to_string(),
            email: "e".to_string(),
            role: "r".to_string(),
        });
        assert_eq!(session.user_id(), None);
        session.user.as_mut().unwrap().id = 7;
        assert_eq!(session.user_id(), Some(7));
    }
}
