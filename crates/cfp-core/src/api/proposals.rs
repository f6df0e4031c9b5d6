//! `/api/proposals` endpoints: search, detail, submission, status changes,
//! reviews and attachment download.

use anyhow::{Context, Result};
use cfp_types::{
    NewProposal, Paginator, Proposal, ProposalSearchHit, ProposalSearchParams,
    ProposalShowResponse, ProposalStatus, Review, ReviewSearchHit, ReviewSearchParams,
    ReviewUpsertPayload,
};
use percent_encoding::percent_decode_str;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;

use crate::http::ApiClient;

/// A downloaded proposal attachment.
#[derive(Debug, Clone)]
pub struct AttachmentDownload {
    pub bytes: Vec<u8>,
    /// Filename announced by the server, if any.
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusChange {
    status: ProposalStatus,
}

#[derive(Clone)]
pub struct ProposalsApi {
    client: ApiClient,
}

impl ProposalsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn search(
        &self,
        params: &ProposalSearchParams,
    ) -> Result<Paginator<ProposalSearchHit>> {
        self.client
            .get_json_with_query("/api/proposals", &params.query_pairs())
            .await
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn get(&self, id: u64) -> Result<ProposalShowResponse> {
        self.client.get_json(&format!("/api/proposals/{id}")).await
    }

    /// Submits a new proposal as multipart form data.
    ///
    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn create(&self, proposal: &NewProposal) -> Result<Proposal> {
        let form = build_form(proposal)?;
        self.client.post_multipart("/api/proposals", form).await
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn change_status(&self, id: u64, status: ProposalStatus) -> Result<Value> {
        self.client
            .patch_json(
                &format!("/api/proposals/{id}/status"),
                &StatusChange { status },
            )
            .await
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn list_reviews(
        &self,
        proposal_id: u64,
        params: &ReviewSearchParams,
    ) -> Result<Paginator<ReviewSearchHit>> {
        self.client
            .get_json_with_query(&format!("/api/proposals/{proposal_id}/reviews"), params)
            .await
    }

    /// Creates or replaces the caller's own review of a proposal.
    ///
    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn upsert_my_review(
        &self,
        proposal_id: u64,
        payload: &ReviewUpsertPayload,
    ) -> Result<Review> {
        self.client
            .put_json(&format!("/api/proposals/{proposal_id}/reviews/me"), payload)
            .await
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn download_attachment(&self, proposal_id: u64) -> Result<AttachmentDownload> {
        let download = self
            .client
            .get_bytes(&format!("/api/proposals/{proposal_id}/attachment"))
            .await?;

        Ok(AttachmentDownload {
            filename: download
                .content_disposition
                .as_deref()
                .and_then(filename_from_content_disposition),
            bytes: download.bytes,
            content_type: download.content_type,
        })
    }
}

fn build_form(proposal: &NewProposal) -> Result<Form> {
    let mut form = Form::new()
        .text("title", proposal.title.clone())
        .text("description", proposal.description.clone());

    for id in &proposal.tag_ids {
        form = form.text("tag_ids[]", id.to_string());
    }

    if let Some(attachment) = &proposal.attachment {
        let part = Part::bytes(attachment.bytes.clone())
            .file_name(attachment.filename.clone())
            .mime_str(&attachment.mime_type)
            .with_context(|| format!("Invalid attachment type: {}", attachment.mime_type))?;
        form = form.part("attachment", part);
    }

    Ok(form)
}

/// Extracts a filename from a `Content-Disposition` header.
///
/// Tries `filename*=UTF-8''<percent-encoded>`, then `filename="..."`, then a
/// bare `filename=...`. Percent-decoding failures fall back to the raw value.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut quoted = None;
    let mut bare = None;

    for param in header.split(';').map(str::trim) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        if key == "filename*" {
            let encoded = value
                .get(..7)
                .filter(|prefix| prefix.eq_ignore_ascii_case("UTF-8''"))
                .map_or(value, |_| &value[7..]);
            if !encoded.is_empty() {
                let decoded = percent_decode_str(encoded)
                    .decode_utf8()
                    .map_or_else(|_| encoded.to_string(), |s| s.into_owned());
                return Some(decoded);
            }
        } else if key == "filename" {
            if let Some(inner) = value
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
            {
                if !inner.is_empty() && quoted.is_none() {
                    quoted = Some(inner.to_string());
                }
            } else if !value.is_empty() && bare.is_none() {
                bare = Some(value.to_string());
            }
        }
    }

    quoted.or(bare)
}
