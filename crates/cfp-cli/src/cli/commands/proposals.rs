//! Proposal and review command handlers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cfp_core::api::ProposalsApi;
use cfp_types::{
    Attachment, NewProposal, Paginator, Proposal, ProposalSearchParams, ProposalStatus,
    ReviewSearchParams, ReviewUpsertPayload,
};
use tracing::debug;

use super::{Ctx, print_json};

pub struct CreateOptions {
    pub title: String,
    pub description: String,
    pub tag_ids: Vec<u64>,
    pub attachment: Option<PathBuf>,
    pub mime: Option<String>,
}

fn api(ctx: &Ctx) -> ProposalsApi {
    ProposalsApi::new(ctx.app.client().clone())
}

/// MIME type for the attachment formats the backend accepts.
fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        Some("key") => "application/vnd.apple.keynote",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

fn read_attachment(path: &Path, mime: Option<String>) -> Result<Attachment> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let filename = path
        .file_name()
        .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(Attachment {
        filename,
        mime_type: mime.unwrap_or_else(|| guess_mime(path).to_string()),
        bytes,
    })
}

fn proposal_line(proposal: &Proposal) -> String {
    let tags = if proposal.tag_names.is_empty() {
        String::new()
    } else {
        format!("  [{}]", proposal.tag_names.join(", "))
    };
    format!(
        "#{:<5} {:<9} {}{tags}",
        proposal.id,
        proposal.status.label(),
        proposal.title
    )
}

fn page_footer<T>(page: &Paginator<T>) {
    let more = if page.has_more() { " (use --page for more)" } else { "" };
    println!(
        "Page {}/{} · {} total{more}",
        page.current_page, page.last_page, page.total
    );
}

pub async fn search(ctx: &mut Ctx, params: &ProposalSearchParams, json: bool) -> Result<()> {
    ctx.require_login().await?;

    let result = api(ctx).search(params).await;
    let page = ctx.settle(result)?;

    if json {
        return print_json(&page);
    }

    if page.data.is_empty() {
        println!("No proposals found.");
        return Ok(());
    }
    for hit in &page.data {
        println!("{}", proposal_line(&hit.model));
    }
    page_footer(&page);
    Ok(())
}

pub async fn show(ctx: &mut Ctx, id: u64, json: bool) -> Result<()> {
    ctx.require_login().await?;

    let result = api(ctx).get(id).await;
    let detail = ctx.settle(result)?;

    if json {
        return print_json(&detail);
    }

    let proposal = &detail.proposal;
    println!("{}", proposal.title);
    println!("  id:      {}", proposal.id);
    println!("  status:  {}", proposal.status.label());
    println!("  speaker: {}", proposal.speaker_id);
    if !proposal.tag_names.is_empty() {
        println!("  tags:    {}", proposal.tag_names.join(", "));
    }
    if let Some(count) = proposal.reviews_count {
        println!("  reviews: {count}");
    }
    if let Some(created) = proposal.created_at {
        println!("  created: {}", created.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(link) = &detail.attachment {
        println!("  attachment: {} (expires {})", link.url, link.expires_at);
    }
    println!();
    println!("{}", proposal.description);
    Ok(())
}

pub async fn create(ctx: &mut Ctx, options: CreateOptions) -> Result<()> {
    ctx.require_login().await?;

    let attachment = options
        .attachment
        .as_deref()
        .map(|path| read_attachment(path, options.mime))
        .transpose()?;
    let proposal = NewProposal {
        title: options.title,
        description: options.description,
        tag_ids: options.tag_ids,
        attachment,
    };

    let result = api(ctx).create(&proposal).await;
    let created = ctx.settle(result)?;
    println!("✓ Submitted proposal #{}: {}", created.id, created.title);
    Ok(())
}

pub async fn change_status(ctx: &mut Ctx, id: u64, status: ProposalStatus) -> Result<()> {
    ctx.require_login().await?;

    let result = api(ctx).change_status(id, status).await;
    let body = ctx.settle(result)?;
    debug!(?body, "status changed");
    println!("✓ Proposal #{id} is now {}", status.label());
    Ok(())
}

pub async fn download(ctx: &mut Ctx, id: u64, out: Option<PathBuf>) -> Result<()> {
    ctx.require_login().await?;

    let result = api(ctx).download_attachment(id).await;
    let download = ctx.settle(result)?;

    let path = out.unwrap_or_else(|| {
        PathBuf::from(
            download
                .filename
                .as_deref()
                .and_then(|name| Path::new(name).file_name())
                .map_or_else(
                    || format!("proposal-{id}-attachment"),
                    |name| name.to_string_lossy().into_owned(),
                ),
        )
    });
    fs::write(&path, &download.bytes).with_context(|| format!("write {}", path.display()))?;
    println!(
        "✓ Saved {} ({} bytes)",
        path.display(),
        download.bytes.len()
    );
    Ok(())
}

pub async fn reviews(ctx: &mut Ctx, id: u64, params: &ReviewSearchParams) -> Result<()> {
    ctx.require_login().await?;

    let result = api(ctx).list_reviews(id, params).await;
    let page = ctx.settle(result)?;

    if page.data.is_empty() {
        println!("No reviews yet.");
        return Ok(());
    }
    for hit in &page.data {
        let review = &hit.model;
        let stars = "★".repeat(usize::from(review.rating.min(5)));
        println!(
            "{stars:<5}  reviewer {}  {}",
            review.reviewer_id,
            review.comment.as_deref().unwrap_or("")
        );
    }
    page_footer(&page);
    Ok(())
}

pub async fn review(ctx: &mut Ctx, id: u64, rating: u8, comment: Option<String>) -> Result<()> {
    ctx.require_login().await?;

    let payload = ReviewUpsertPayload { rating, comment };
    let result = api(ctx).upsert_my_review(id, &payload).await;
    let saved = ctx.settle(result)?;
    println!("✓ Saved your review of proposal #{id} ({}/5)", saved.rating);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime_by_extension() {
        assert_eq!(guess_mime(Path::new("talk.PDF")), "application/pdf");
        assert_eq!(
            guess_mime(Path::new("slides.pptx")),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        );
        assert_eq!(guess_mime(Path::new("notes")), "application/octet-stream");
    }
}
