//! Typed wrappers around the backend REST resources, one per resource.

pub mod auth;
pub mod notifications;
pub mod proposals;
pub mod tags;

pub use auth::AuthApi;
pub use notifications::NotificationsApi;
pub use proposals::ProposalsApi;
pub use tags::TagsApi;
