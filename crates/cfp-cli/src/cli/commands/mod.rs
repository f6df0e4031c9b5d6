//! CLI command handlers.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use cfp_core::config::Settings;
use cfp_core::storage::FileTokenStorage;
use cfp_core::{App, Navigation, Route};
use serde::Serialize;

pub mod auth;
pub mod config;
pub mod notifications;
pub mod proposals;
pub mod tags;

pub const NOT_LOGGED_IN: &str = "Not logged in. Run `cfp login`.";
pub const SESSION_EXPIRED: &str = "Session expired. Run `cfp login`.";

/// State shared by every command of one invocation.
pub struct Ctx {
    pub settings: Settings,
    pub app: App,
}

impl Ctx {
    pub fn open(settings: Settings) -> Result<Self> {
        let storage = Arc::new(FileTokenStorage::default_location());
        let app = App::from_settings(&settings, storage).context("create API client")?;
        Ok(Self { settings, app })
    }

    /// Runs the guard for a signed-in-only command.
    pub async fn require_login(&mut self) -> Result<()> {
        match self.app.navigate(Route::Dashboard).await {
            Navigation::Allow => Ok(()),
            Navigation::Redirect(_) => bail!(NOT_LOGGED_IN),
        }
    }

    /// Surfaces a rejected token as a sign-out instead of a raw 401.
    pub fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Some(Navigation::Redirect(Route::Login)) = self.app.drain_signals() {
            bail!(SESSION_EXPIRED);
        }
        result
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
