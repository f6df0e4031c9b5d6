//! Pusher websocket connection running on a background task.
//!
//! Callers talk to the task through a command queue, so the public handle is
//! synchronous and can be shared behind `Arc<dyn Broadcaster>`. The task owns
//! the socket, re-authorizes every joined channel after a reconnect and
//! forwards notification payloads to the per-channel receivers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use super::protocol::{self, Frame};
use super::{Broadcaster, PushReceiver, PushSender, RealtimeSettings};
use crate::error::ApiError;
use crate::http::ApiClient;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for the idle period before we ping.
const MAX_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Lifecycle of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

enum Command {
    Subscribe { channel: String, sink: PushSender },
    Leave { channel: String },
}

enum SessionEnd {
    /// Every handle was dropped.
    Shutdown,
    /// The server refused us for good (Pusher codes 4000-4099).
    Refused { code: u64, message: String },
    Lost(anyhow::Error),
}

#[derive(Deserialize)]
struct ChannelAuth {
    auth: String,
}

/// Handle to the background connection.
pub struct PusherConnection {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    settings: RealtimeSettings,
}

impl PusherConnection {
    /// Spawns the connection task on the current tokio runtime.
    ///
    /// Returns `None` outside a runtime.
    pub fn connect(settings: RealtimeSettings, client: ApiClient) -> Option<Arc<Self>> {
        let Ok(handle) = Handle::try_current() else {
            warn!("no async runtime available; live notifications are disabled");
            return None;
        };

        let (commands, queue) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);

        let worker = Worker {
            settings: settings.clone(),
            client,
            queue,
            state: state_tx,
            channels: HashMap::new(),
            socket_id: None,
        };
        handle.spawn(worker.run());

        Some(Arc::new(Self {
            commands,
            state,
            settings,
        }))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn settings(&self) -> &RealtimeSettings {
        &self.settings
    }

    /// Resolves once the server has acknowledged the connection.
    /// Returns `false` if the task stopped first.
    pub async fn wait_connected(&self) -> bool {
        let mut state = self.state.clone();
        state
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .is_ok()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|err| anyhow!("Realtime connection is closed: {err}"))
    }
}

impl Broadcaster for PusherConnection {
    fn subscribe_private(&self, channel: &str) -> Result<PushReceiver> {
        let (sink, receiver) = mpsc::unbounded_channel();
        self.send(Command::Subscribe {
            channel: protocol::private_channel(channel),
            sink,
        })?;
        Ok(receiver)
    }

    fn leave(&self, channel: &str) -> Result<()> {
        self.send(Command::Leave {
            channel: protocol::private_channel(channel),
        })
    }
}

struct Worker {
    settings: RealtimeSettings,
    client: ApiClient,
    queue: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    /// Joined channels by wire name.
    channels: HashMap<String, PushSender>,
    socket_id: Option<String>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            self.state.send_replace(ConnectionState::Connecting);
            let end = self.session().await;
            self.socket_id = None;
            self.state.send_replace(ConnectionState::Disconnected);

            match end {
                SessionEnd::Shutdown => return,
                SessionEnd::Refused { code, message } => {
                    error!(
                        code,
                        %message,
                        "realtime server refused the connection, not reconnecting"
                    );
                    return;
                }
                SessionEnd::Lost(err) => {
                    warn!(
                        "realtime connection lost, retrying in {:.1}s: {err:#}",
                        self.settings.reconnect_delay.as_secs_f32()
                    );
                }
            }

            if !self.wait_before_reconnect().await {
                return;
            }
        }
    }

    /// Keeps bookkeeping commands flowing while offline. Returns `false`
    /// when every handle was dropped.
    async fn wait_before_reconnect(&mut self) -> bool {
        let delay = tokio::time::sleep(self.settings.reconnect_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                () = &mut delay => return true,
                command = self.queue.recv() => match command {
                    Some(command) => self.record(command),
                    None => return false,
                },
            }
        }
    }

    fn record(&mut self, command: Command) {
        match command {
            Command::Subscribe { channel, sink } => {
                self.channels.insert(channel, sink);
            }
            Command::Leave { channel } => {
                self.channels.remove(&channel);
            }
        }
    }

    async fn session(&mut self) -> SessionEnd {
        let url = self.settings.socket_url();
        debug!(host = %self.settings.host, port = self.settings.port, "opening realtime connection");

        let socket = match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await
        {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(err)) => return SessionEnd::Lost(err.into()),
            Err(_) => return SessionEnd::Lost(anyhow!("connection attempt timed out")),
        };
        let (mut sink, mut stream) = socket.split();

        let mut period = MAX_ACTIVITY_TIMEOUT;
        let mut ticker = activity_ticker(period);
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                message = stream.next() => {
                    let text = match message {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            return SessionEnd::Lost(anyhow!("connection closed by server"));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => return SessionEnd::Lost(err.into()),
                    };
                    awaiting_pong = false;
                    ticker.reset();

                    let frame = match protocol::parse_frame(text.as_str()) {
                        Ok(frame) => frame,
                        Err(err) => {
                            debug!("ignoring unreadable frame: {err:#}");
                            continue;
                        }
                    };

                    if let Frame::ConnectionEstablished { activity_timeout: Some(secs), .. } = &frame {
                        let announced = Duration::from_secs(*secs).min(MAX_ACTIVITY_TIMEOUT);
                        if !announced.is_zero() && announced != period {
                            period = announced;
                            ticker = activity_ticker(period);
                        }
                    }

                    if let Frame::Error { code: Some(code), message } = &frame
                        && protocol::is_fatal_error(*code)
                    {
                        let _ = sink.close().await;
                        return SessionEnd::Refused {
                            code: *code,
                            message: message.clone(),
                        };
                    }

                    if let Err(err) = self.handle_frame(frame, &mut sink).await {
                        return SessionEnd::Lost(err);
                    }
                }
                command = self.queue.recv() => {
                    let Some(command) = command else {
                        let _ = sink.close().await;
                        return SessionEnd::Shutdown;
                    };
                    if let Err(err) = self.apply(command, &mut sink).await {
                        return SessionEnd::Lost(err);
                    }
                }
                _ = ticker.tick() => {
                    if awaiting_pong {
                        return SessionEnd::Lost(anyhow!("server stopped responding"));
                    }
                    if let Err(err) = send_text(&mut sink, protocol::ping_frame()).await {
                        return SessionEnd::Lost(err);
                    }
                    awaiting_pong = true;
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame, sink: &mut WsSink) -> Result<()> {
        match frame {
            Frame::ConnectionEstablished { socket_id, .. } => {
                info!(%socket_id, "realtime connection established");
                self.socket_id = Some(socket_id);
                self.state.send_replace(ConnectionState::Connected);

                let channels: Vec<String> = self.channels.keys().cloned().collect();
                for channel in channels {
                    self.join(&channel, sink).await?;
                }
            }
            Frame::Ping => send_text(sink, protocol::pong_frame()).await?,
            Frame::Pong => {}
            Frame::Error { code, message } => {
                warn!(?code, %message, "realtime server error");
            }
            Frame::SubscriptionSucceeded { channel } => {
                debug!(%channel, "subscribed");
            }
            Frame::Event {
                channel,
                event,
                data,
            } => {
                if event == protocol::NOTIFICATION_EVENT {
                    self.deliver(&channel, data);
                } else {
                    debug!(%channel, %event, "ignoring event");
                }
            }
            Frame::Other { event } => {
                debug!(%event, "ignoring frame");
            }
        }
        Ok(())
    }

    fn deliver(&mut self, channel: &str, data: serde_json::Value) {
        let Some(receiver) = self.channels.get(channel) else {
            debug!(%channel, "notification for a channel we are not in");
            return;
        };
        if receiver.send(data).is_err() {
            debug!(%channel, "receiver dropped, forgetting channel");
            self.channels.remove(channel);
        }
    }

    async fn apply(&mut self, command: Command, sink: &mut WsSink) -> Result<()> {
        match command {
            Command::Subscribe { channel, sink: receiver } => {
                self.channels.insert(channel.clone(), receiver);
                if self.socket_id.is_some() {
                    self.join(&channel, sink).await?;
                }
            }
            Command::Leave { channel } => {
                if self.channels.remove(&channel).is_some() && self.socket_id.is_some() {
                    debug!(%channel, "leaving channel");
                    send_text(sink, protocol::unsubscribe_frame(&channel)).await?;
                }
            }
        }
        Ok(())
    }

    /// Authorizes and subscribes one channel. Authorization failures are
    /// logged and leave the socket usable; only write failures are returned.
    async fn join(&self, channel: &str, sink: &mut WsSink) -> Result<()> {
        let Some(socket_id) = self.socket_id.as_deref() else {
            return Ok(());
        };

        match self.authorize(socket_id, channel).await {
            Ok(auth) => send_text(sink, protocol::subscribe_frame(channel, Some(&auth))).await,
            Err(err) => {
                warn!(%channel, "channel authorization failed: {err:#}");
                Ok(())
            }
        }
    }

    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<String> {
        let mut request = self
            .client
            .http()
            .post(&self.settings.auth_endpoint)
            .form(&[("socket_id", socket_id), ("channel_name", channel)]);
        if let Some(token) = self.client.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ApiError::transport(&err))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::transport(&err))?;

        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &body).into());
        }

        let auth: ChannelAuth = serde_json::from_str(&body)
            .map_err(|err| {
                debug!("unreadable channel authorization body: {err}");
                ApiError::malformed("channel authorization")
            })?;
        Ok(auth.auth)
    }
}

fn activity_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn send_text(sink: &mut WsSink, frame: String) -> Result<()> {
    sink.send(Message::text(frame))
        .await
        .context("Failed to write to realtime socket")
}
