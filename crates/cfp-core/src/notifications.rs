//! Notification feed store.
//!
//! Mirrors the server feed plus the unread counter and merges real-time
//! pushes into it. The feed is newest-first, unique by id and holds at most
//! [`FEED_LIMIT`] items.
//!
//! Push ordering: [`NotificationStore::apply_push`] first applies the
//! optimistic `unread + 1` and only then awaits the authoritative refresh,
//! both on the caller's task. The refresh result therefore always lands last
//! and overrides the optimistic value.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use cfp_types::{NotificationItem, NotificationQuery};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::NotificationsApi;
use crate::api::notifications::item_from_push;
use crate::error::error_message;
use crate::http::ApiClient;
use crate::realtime::{self, Broadcaster, PushReceiver};
use crate::session::{LoadingGuard, Session};

/// Maximum number of retained feed items.
pub const FEED_LIMIT: usize = 100;

const LOAD_FAILED: &str = "Failed to load notifications";
const READ_ALL_FAILED: &str = "Failed to mark notifications as read";

/// Private channel carrying a user's notifications (without the `private-`
/// prefix).
pub fn user_channel(user_id: u64) -> String {
    format!("App.Models.User.{user_id}")
}

struct Subscription {
    channel: String,
    connection: Arc<dyn Broadcaster>,
    receiver: PushReceiver,
}

pub struct NotificationStore {
    api: NotificationsApi,
    items: VecDeque<NotificationItem>,
    unread: u64,
    loading: bool,
    error: Option<String>,
    subscription: Option<Subscription>,
}

impl NotificationStore {
    pub fn new(client: &ApiClient) -> Self {
        Self::with_api(NotificationsApi::new(client.clone()))
    }

    pub fn with_api(api: NotificationsApi) -> Self {
        Self {
            api,
            items: VecDeque::new(),
            unread: 0,
            loading: false,
            error: None,
            subscription: None,
        }
    }

    /// Feed items, newest first.
    pub fn items(&self) -> impl ExactSizeIterator<Item = &NotificationItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unread(&self) -> u64 {
        self.unread
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn subscribed_channel(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.channel.as_str())
    }

    /// Replaces the feed with the server's latest page.
    ///
    /// On failure the feed is emptied and the message kept in
    /// [`NotificationStore::error`]; `unread` is left alone.
    pub async fn fetch_latest(&mut self, query: &NotificationQuery) {
        self.error = None;

        let result = {
            let _loading = LoadingGuard::start(&mut self.loading);
            self.api.list(query).await
        };

        match result {
            Ok(page) => {
                let mut seen = HashSet::new();
                self.items = page
                    .items
                    .into_iter()
                    .filter(|item| seen.insert(item.id.clone()))
                    .take(FEED_LIMIT)
                    .collect();
                self.unread = page.unread;
            }
            Err(err) => {
                self.error = Some(error_message(&err, LOAD_FAILED));
                self.items.clear();
            }
        }
    }

    /// Overwrites `unread` with the server count. Failures keep the
    /// previous value.
    pub async fn refresh_unread(&mut self) {
        match self.api.unread_count().await {
            Ok(unread) => self.unread = unread,
            Err(err) => debug!("unread refresh failed: {err:#}"),
        }
    }

    /// Joins the current user's private channel.
    ///
    /// Uses `connection` when given, else the process-wide one. Does nothing
    /// without a signed-in user, without a connection, or when already on
    /// the right channel. Returns whether a subscription is active afterwards.
    pub fn connect_if_configured(
        &mut self,
        session: &Session,
        connection: Option<Arc<dyn Broadcaster>>,
    ) -> bool {
        let Some(user_id) = session.user_id() else {
            return self.subscription.is_some();
        };

        let Some(connection) = connection.or_else(realtime::global) else {
            warn!("no realtime connection available; live notifications are off");
            return self.subscription.is_some();
        };

        let channel = user_channel(user_id);
        if self.subscribed_channel() == Some(channel.as_str()) {
            return true;
        }

        self.leave_current();

        info!(%channel, "subscribing to notifications");
        match connection.subscribe_private(&channel) {
            Ok(receiver) => {
                self.subscription = Some(Subscription {
                    channel,
                    connection,
                    receiver,
                });
                true
            }
            Err(err) => {
                warn!(%channel, "failed to subscribe: {err:#}");
                false
            }
        }
    }

    /// Leaves the active channel, if any.
    pub fn disconnect(&mut self) {
        self.leave_current();
    }

    fn leave_current(&mut self) {
        let Some(previous) = self.subscription.take() else {
            return;
        };
        if let Err(err) = previous.connection.leave(&previous.channel) {
            debug!(channel = %previous.channel, "leave failed: {err:#}");
        }
    }

    /// Waits for the next pushed payload.
    ///
    /// Returns `None` immediately when not subscribed, or once the
    /// connection stops delivering.
    pub async fn next_push(&mut self) -> Option<Value> {
        let subscription = self.subscription.as_mut()?;
        subscription.receiver.recv().await
    }

    /// Merges a pushed payload, then reconciles `unread` with the server.
    pub async fn apply_push(&mut self, payload: &Value) {
        let item = item_from_push(payload, Utc::now());
        self.push_incoming(item);
        self.refresh_unread().await;
    }

    /// Marks everything read on the server, then mirrors it locally.
    ///
    /// Only items still unread get the current timestamp. On failure the
    /// feed and counter are untouched and the message is kept in
    /// [`NotificationStore::error`].
    pub async fn read_all_remote(&mut self) {
        self.error = None;

        if let Err(err) = self.api.read_all().await {
            self.error = Some(error_message(&err, READ_ALL_FAILED));
            return;
        }

        let now = Utc::now();
        for item in self.items.iter_mut().filter(|item| item.read_at.is_none()) {
            item.read_at = Some(now);
        }
        self.unread = 0;

        self.refresh_unread().await;
    }

    /// Prepends `item` unless its id is empty or already in the feed.
    pub fn push_incoming(&mut self, item: NotificationItem) {
        if item.id.is_empty() || self.items.iter().any(|existing| existing.id == item.id) {
            return;
        }

        let unread = item.read_at.is_none();
        self.items.push_front(item);
        self.items.truncate(FEED_LIMIT);

        if unread {
            self.unread += 1;
        }
    }
}
