//! Tag command handlers.

use anyhow::Result;
use cfp_core::api::TagsApi;
use cfp_types::TagQuery;

use super::{Ctx, print_json};

pub async fn list(
    ctx: &mut Ctx,
    search: Option<String>,
    limit: Option<u32>,
    json: bool,
) -> Result<()> {
    ctx.require_login().await?;

    let query = TagQuery { search, limit };
    let result = TagsApi::new(ctx.app.client().clone()).list(&query).await;
    let tags = ctx.settle(result)?;

    if json {
        return print_json(&tags);
    }
    if tags.is_empty() {
        println!("No tags.");
    }
    for tag in &tags {
        println!("{:>4}  {}", tag.id, tag.name);
    }
    Ok(())
}
