//! Client SDK for the call-for-papers backend.
//!
//! Configuration, token persistence, the HTTP layer and typed resource APIs,
//! plus the stateful pieces a front end needs: the auth session store, the
//! real-time channel manager, the notification feed and the navigation guard.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod logging;
pub mod notifications;
pub mod realtime;
pub mod session;
pub mod storage;

pub use app::App;
pub use error::ApiError;
pub use guard::{Navigation, Route};
pub use http::{ApiClient, SessionSignal};
pub use notifications::NotificationStore;
pub use session::{AuthStore, Session};
