//! Real-time channel manager.
//!
//! One pub/sub connection per process, authorized per private channel with
//! the current bearer token. The connection is reachable through a
//! process-wide accessor so independent stores can share it without
//! knowing who created it.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::{RealtimeOptions, Settings};
use crate::http::ApiClient;

pub mod protocol;
mod pusher;

pub use pusher::{ConnectionState, PusherConnection};

/// Payloads delivered on a subscribed channel.
pub type PushReceiver = mpsc::UnboundedReceiver<Value>;
pub type PushSender = mpsc::UnboundedSender<Value>;

/// A pub/sub connection able to join private channels.
///
/// Channel names are given without the `private-` prefix.
pub trait Broadcaster: Send + Sync {
    /// Joins a private channel and returns the stream of notification
    /// payloads pushed on it.
    ///
    /// # Errors
    /// Returns an error if the connection is gone.
    fn subscribe_private(&self, channel: &str) -> Result<PushReceiver>;

    /// Leaves a channel. Leaving a channel that was never joined is a no-op.
    ///
    /// # Errors
    /// Returns an error if the connection is gone.
    fn leave(&self, channel: &str) -> Result<()>;
}

/// Validated connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeSettings {
    pub key: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub auth_endpoint: String,
    /// Pause between a lost connection and the next attempt.
    pub reconnect_delay: Duration,
}

impl RealtimeSettings {
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

    /// Returns `None` (with a warning) when no application key is configured.
    pub fn from_options(options: &RealtimeOptions) -> Option<Self> {
        let Some(key) = options.key.clone().filter(|k| !k.trim().is_empty()) else {
            warn!("realtime key is empty; live notifications are disabled");
            return None;
        };

        Some(Self {
            key,
            host: options.host.clone(),
            port: options.port,
            tls: options.tls,
            auth_endpoint: options.auth_endpoint.clone(),
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
        })
    }

    /// Websocket URL for this application.
    pub fn socket_url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!(
            "{scheme}://{}:{}/app/{}?protocol={}&client=cfp&version={}",
            self.host,
            self.port,
            self.key,
            protocol::PROTOCOL_VERSION,
            env!("CARGO_PKG_VERSION"),
        )
    }
}

static CONNECTION: RwLock<Option<Arc<dyn Broadcaster>>> = RwLock::new(None);

/// Makes `connection` the process-wide connection, replacing any previous one.
pub fn install(connection: Arc<dyn Broadcaster>) {
    let mut slot = CONNECTION.write().unwrap_or_else(PoisonError::into_inner);
    *slot = Some(connection);
}

/// Drops the process-wide connection.
pub fn uninstall() {
    let mut slot = CONNECTION.write().unwrap_or_else(PoisonError::into_inner);
    *slot = None;
}

/// The process-wide connection, if one was installed.
pub fn global() -> Option<Arc<dyn Broadcaster>> {
    CONNECTION
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Builds the Pusher connection from settings and installs it globally.
///
/// Fails softly: returns `None` (and logs a warning) when the key is missing
/// or no async runtime is available.
pub fn init(settings: &Settings, client: &ApiClient) -> Option<Arc<PusherConnection>> {
    let realtime = RealtimeSettings::from_options(&settings.realtime)?;
    let connection = PusherConnection::connect(realtime, client.clone())?;
    let shared: Arc<dyn Broadcaster> = Arc::<PusherConnection>::clone(&connection);
    install(shared);
    Some(connection)
}
