//! Notification command handlers.

use std::sync::Arc;

use anyhow::{Result, bail};
use cfp_core::api::NotificationsApi;
use cfp_core::realtime::{self, Broadcaster};
use cfp_types::{NotificationItem, NotificationQuery};
use chrono::Local;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use super::{Ctx, SESSION_EXPIRED, print_json};

const NOT_CONFIGURED: &str =
    "Live notifications are not configured. Set realtime.key in config.toml or CFP_PUSHER_APP_KEY.";

fn format_item(item: &NotificationItem) -> String {
    let marker = if item.is_unread() { "●" } else { " " };
    let when = item.created_at.map_or_else(
        || "                ".to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    );
    format!("{marker} {when}  {}", item.summary())
}

pub async fn list(ctx: &mut Ctx, limit: u32, search: Option<String>, json: bool) -> Result<()> {
    ctx.require_login().await?;

    let query = NotificationQuery {
        limit: Some(limit),
        search,
    };
    ctx.app.notifications_mut().fetch_latest(&query).await;
    ctx.settle(Ok(()))?;

    let store = ctx.app.notifications();
    if let Some(message) = store.error() {
        bail!("{message}");
    }

    if json {
        let items: Vec<&NotificationItem> = store.items().collect();
        return print_json(&serde_json::json!({
            "items": items,
            "unread": store.unread(),
        }));
    }

    if store.is_empty() {
        println!("No notifications.");
    }
    for item in store.items() {
        println!("{}", format_item(item));
    }
    println!("{} unread", store.unread());
    Ok(())
}

pub async fn unread(ctx: &mut Ctx) -> Result<()> {
    ctx.require_login().await?;

    let result = NotificationsApi::new(ctx.app.client().clone())
        .unread_count()
        .await;
    let count = ctx.settle(result)?;
    println!("{count}");
    Ok(())
}

pub async fn read_all(ctx: &mut Ctx) -> Result<()> {
    ctx.require_login().await?;

    ctx.app.notifications_mut().read_all_remote().await;
    ctx.settle(Ok(()))?;

    if let Some(message) = ctx.app.notifications().error() {
        bail!("{message}");
    }
    println!("✓ All notifications marked as read");
    Ok(())
}

/// Prints the feed, then every pushed notification until Ctrl-C or until
/// the server rejects the session.
pub async fn watch(ctx: &mut Ctx) -> Result<()> {
    ctx.require_login().await?;

    let Some(connection) = realtime::init(&ctx.settings, ctx.app.client()) else {
        bail!(NOT_CONFIGURED);
    };
    let connection: Arc<dyn Broadcaster> = connection;

    let mut signals = ctx.app.client().subscribe();

    ctx.app
        .notifications_mut()
        .fetch_latest(&NotificationQuery {
            limit: Some(20),
            search: None,
        })
        .await;
    ctx.settle(Ok(()))?;
    if let Some(message) = ctx.app.notifications().error() {
        eprintln!("Warning: {message}");
    }
    for item in ctx.app.notifications().items() {
        println!("{}", format_item(item));
    }
    println!(
        "{} unread. Waiting for notifications (Ctrl-C to stop)...",
        ctx.app.notifications().unread()
    );

    if !ctx.app.connect_notifications(Some(connection)) {
        realtime::uninstall();
        bail!("Could not subscribe to the notification channel");
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            push = ctx.app.notifications_mut().next_push() => {
                let Some(payload) = push else {
                    break Err(anyhow::anyhow!("Notification stream closed"));
                };
                show_push(ctx, &payload).await;
            }
            signal = signals.recv() => {
                match signal {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        if ctx.app.drain_signals().is_some() {
                            break Err(anyhow::anyhow!(SESSION_EXPIRED));
                        }
                    }
                    Err(RecvError::Closed) => break Ok(()),
                }
            }
        }
    };

    ctx.app.notifications_mut().disconnect();
    realtime::uninstall();
    outcome
}

fn newest_id(ctx: &Ctx) -> Option<String> {
    ctx.app.notifications().items().next().map(|item| item.id.clone())
}

async fn show_push(ctx: &mut Ctx, payload: &Value) {
    let before = newest_id(ctx);
    ctx.app.notifications_mut().apply_push(payload).await;

    // Duplicates leave the feed untouched.
    if newest_id(ctx) == before {
        return;
    }
    let store = ctx.app.notifications();
    if let Some(item) = store.items().next() {
        println!("{}  ({} unread)", format_item(item), store.unread());
    }
}
