//! Top-level coordinator.
//!
//! Owns the stores and is the single consumer of the transport's session
//! signals: a rejected token is handled here, once, by clearing the session,
//! leaving the notification channel and sending the user to the login entry
//! point.

use std::sync::Arc;

use anyhow::Result;
use cfp_types::Registration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::ApiError;
use crate::guard::{Navigation, Route, guard};
use crate::http::{ApiClient, SessionSignal};
use crate::notifications::NotificationStore;
use crate::realtime::Broadcaster;
use crate::session::AuthStore;
use crate::storage::TokenStorage;

pub struct App {
    client: ApiClient,
    auth: AuthStore,
    notifications: NotificationStore,
    signals: broadcast::Receiver<SessionSignal>,
}

impl App {
    /// Builds the client and both stores from resolved settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_settings(settings: &Settings, storage: Arc<dyn TokenStorage>) -> Result<Self> {
        let client = ApiClient::from_settings(settings, storage)?;
        Ok(Self::new(client))
    }

    pub fn new(client: ApiClient) -> Self {
        Self {
            signals: client.subscribe(),
            auth: AuthStore::new(&client),
            notifications: NotificationStore::new(&client),
            client,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn auth_mut(&mut self) -> &mut AuthStore {
        &mut self.auth
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut NotificationStore {
        &mut self.notifications
    }

    /// Bootstraps the session (once per process) and applies the guard.
    pub async fn navigate(&mut self, route: Route) -> Navigation {
        self.auth.bootstrap().await;
        self.drain_signals();
        guard(route, self.auth.session())
    }

    /// Joins the signed-in user's notification channel.
    pub fn connect_notifications(&mut self, connection: Option<Arc<dyn Broadcaster>>) -> bool {
        self.notifications
            .connect_if_configured(self.auth.session(), connection)
    }

    /// Reacts to a transport signal. Returns where the user should go next.
    pub fn handle_signal(&mut self, signal: SessionSignal) -> Navigation {
        match signal {
            SessionSignal::Unauthenticated => {
                info!("session rejected by server, signing out");
                self.notifications.disconnect();
                self.auth.clear_auth();
                Navigation::Redirect(Route::Login)
            }
        }
    }

    /// Handles every signal raised since the last call.
    ///
    /// Returns the redirect of the last handled signal, if any.
    pub fn drain_signals(&mut self) -> Option<Navigation> {
        let mut outcome = None;
        loop {
            match self.signals.try_recv() {
                Ok(signal) => outcome = Some(self.handle_signal(signal)),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "session signals were dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return outcome,
            }
        }
    }

    /// Waits for the next session signal.
    ///
    /// Returns `None` once no client can raise signals anymore.
    pub async fn next_signal(&mut self) -> Option<SessionSignal> {
        loop {
            match self.signals.recv().await {
                Ok(signal) => return Some(signal),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session signals were dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Signs in. A `401` from the credential endpoint means bad credentials,
    /// not a stale session, so it raises no redirect.
    ///
    /// # Errors
    /// Returns the normalized backend error.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), ApiError> {
        self.drain_signals();
        let result = self.auth.login(email, password).await;
        self.discard_signals();
        result
    }

    /// Creates an account and signs in with it.
    ///
    /// # Errors
    /// Returns the normalized backend error.
    pub async fn register(&mut self, registration: &Registration) -> Result<(), ApiError> {
        self.drain_signals();
        let result = self.auth.register(registration).await;
        self.discard_signals();
        result
    }

    fn discard_signals(&mut self) {
        loop {
            match self.signals.try_recv() {
                Ok(signal) => debug!(?signal, "ignoring signal raised by a credential check"),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return,
            }
        }
    }

    /// Leaves the notification channel, then signs out.
    pub async fn logout(&mut self) {
        self.notifications.disconnect();
        self.auth.logout().await;
        // The remote logout may itself have been rejected with a 401.
        self.drain_signals();
    }
}
