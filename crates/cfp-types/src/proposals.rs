use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Review state of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Visual tone used when rendering a status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeTone {
    Warning,
    Success,
    Danger,
}

impl ProposalStatus {
    pub fn all() -> &'static [ProposalStatus] {
        &[
            ProposalStatus::Pending,
            ProposalStatus::Approved,
            ProposalStatus::Rejected,
        ]
    }

    /// Wire identifier.
    pub fn id(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProposalStatus::Pending => "Pending",
            ProposalStatus::Approved => "Approved",
            ProposalStatus::Rejected => "Rejected",
        }
    }

    pub fn tone(self) -> BadgeTone {
        match self {
            ProposalStatus::Approved => BadgeTone::Success,
            ProposalStatus::Rejected => BadgeTone::Danger,
            ProposalStatus::Pending => BadgeTone::Warning,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!(
                "Unknown proposal status: {other} (expected pending, approved or rejected)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub speaker_id: u64,
    pub title: String,
    pub description: String,
    pub status: ProposalStatus,
    #[serde(default)]
    pub attachment_path: Option<String>,
    #[serde(default)]
    pub tag_names: Vec<String>,
    #[serde(default)]
    pub reviews_count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Short-lived signed download URL for a proposal attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryDownloadLink {
    pub url: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalShowResponse {
    pub proposal: Proposal,
    #[serde(default)]
    pub attachment: Option<TemporaryDownloadLink>,
}

/// Search-engine document wrapper around an indexed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument<C> {
    pub id: String,
    pub content: C,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDocument {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub status: ProposalStatus,
    pub speaker_id: u64,
    #[serde(default)]
    pub tag_ids: Vec<u64>,
    #[serde(default)]
    pub tag_names: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalSearchHit {
    pub model: Proposal,
    pub index_name: String,
    pub document: SearchDocument<ProposalDocument>,
    #[serde(default)]
    pub highlight: Option<Value>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Length-aware paginator envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginator<T> {
    pub current_page: u64,
    pub data: Vec<T>,
    #[serde(default)]
    pub first_page_url: Option<String>,
    #[serde(default)]
    pub from: Option<u64>,
    pub last_page: u64,
    #[serde(default)]
    pub last_page_url: Option<String>,
    #[serde(default)]
    pub next_page_url: Option<String>,
    pub path: String,
    pub per_page: u64,
    #[serde(default)]
    pub prev_page_url: Option<String>,
    #[serde(default)]
    pub to: Option<u64>,
    pub total: u64,
}

impl<T> Paginator<T> {
    pub fn has_more(&self) -> bool {
        self.current_page < self.last_page
    }
}

/// Filters for `GET /api/proposals`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalSearchParams {
    pub search: Option<String>,
    pub status: Option<ProposalStatus>,
    pub tag_ids: Vec<u64>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl ProposalSearchParams {
    /// Query pairs with bracketed array keys (`tag_ids[]=1&tag_ids[]=2`).
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        if let Some(status) = self.status {
            pairs.push(("status".to_string(), status.id().to_string()));
        }
        for id in &self.tag_ids {
            pairs.push(("tag_ids[]".to_string(), id.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page".to_string(), per_page.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub proposal_id: u64,
    pub reviewer_id: u64,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub id: u64,
    pub proposal_id: u64,
    pub reviewer_id: u64,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSearchHit {
    pub model: Review,
    pub index_name: String,
    pub document: SearchDocument<ReviewDocument>,
    #[serde(default)]
    pub highlight: Option<Value>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Filters for `GET /api/proposals/{id}/reviews`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_min: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_max: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u64>,
}

/// Body for `PUT /api/proposals/{id}/reviews/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewUpsertPayload {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

/// File uploaded alongside a new proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Multipart form for `POST /api/proposals`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProposal {
    pub title: String,
    pub description: String,
    pub tag_ids: Vec<u64>,
    pub attachment: Option<Attachment>,
}
