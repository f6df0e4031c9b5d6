//! Wire types shared by the cfp client crates.
//!
//! These mirror the JSON shapes served by the proposals backend. Lenient
//! parsing of loosely-shaped payloads happens in `cfp-core`; the types here
//! are the strict internal model that parsing produces.

pub mod auth;
pub mod notifications;
pub mod proposals;
pub mod tags;

pub use auth::{AuthProvider, AuthTokenResponse, MeResponse, Registration, User};
pub use notifications::{NotificationItem, NotificationPage, NotificationQuery};
pub use proposals::{
    Attachment, BadgeTone, NewProposal, Paginator, Proposal, ProposalSearchHit,
    ProposalSearchParams, ProposalShowResponse, ProposalStatus, Review, ReviewSearchHit,
    ReviewSearchParams, ReviewUpsertPayload, TemporaryDownloadLink,
};
pub use tags::{Tag, TagQuery};
