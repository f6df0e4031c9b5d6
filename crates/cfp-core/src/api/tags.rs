//! `/api/tags` endpoint.

use anyhow::Result;
use cfp_types::{Tag, TagQuery};

use crate::http::ApiClient;

#[derive(Clone)]
pub struct TagsApi {
    client: ApiClient,
}

impl TagsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// # Errors
    /// Returns the normalized backend error on failure.
    pub async fn list(&self, query: &TagQuery) -> Result<Vec<Tag>> {
        self.client.get_json_with_query("/api/tags", query).await
    }
}
