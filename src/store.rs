//! Content-store access: posts, re-hosted images, and mirror counters,
//! backed by Supabase (PostgREST for rows, Storage for objects).
//!
//! The trait is the seam the pipeline and its tests work against; the
//! Supabase client is the only live implementation. See `schema.sql` at the
//! repository root for the tables and the atomic counter function this
//! client expects.

use std::collections::BTreeMap;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, Result};
use crate::models::StoredPost;
use crate::utils::truncate_for_log;

/// Rows per page for the category scan.
const SCAN_PAGE_SIZE: u64 = 1000;

/// Everything the pipeline asks of the document store.
pub trait ContentStore {
    /// Count stored posts per category. Categories never posted to are
    /// simply absent from the map.
    async fn category_counts(&self) -> Result<BTreeMap<String, u64>>;

    /// Whether a post with exactly this title already exists.
    async fn title_exists(&self, title: &str) -> Result<bool>;

    /// Insert a post and return its new id.
    async fn insert_post(&self, post: &StoredPost) -> Result<String>;

    /// Download `source_url` and re-host it under `object_path`, returning
    /// the durable public URL. Failures are [`PipelineError::Image`].
    async fn store_image(&self, source_url: &str, object_path: &str) -> Result<String>;

    /// Mirror posts recorded for the month. An absent month reads as zero.
    async fn mirror_count(&self, month_key: &str) -> Result<u64>;

    /// Record one more mirror post for the month, creating the row when the
    /// month is new. The increment is atomic on the server.
    async fn bump_mirror_count(&self, month_key: &str) -> Result<()>;
}

/// Live Supabase client.
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

#[derive(Deserialize)]
struct CategoryRow {
    category: String,
}

#[derive(Deserialize)]
struct InsertedRow {
    id: String,
}

#[derive(Deserialize)]
struct CounterRow {
    posts: u64,
}

impl SupabaseStore {
    pub fn new(client: Client, base_url: &str, service_key: String, bucket: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn public_object_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{object_path}",
            self.base_url, self.bucket
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

async fn require_success(
    response: Response,
    what: &str,
    class: fn(String) -> PipelineError,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let detail = response.text().await.unwrap_or_default();
        Err(class(format!(
            "{what}: HTTP {status}: {}",
            truncate_for_log(&detail, 200)
        )))
    }
}

impl ContentStore for SupabaseStore {
    #[instrument(level = "info", skip_all)]
    async fn category_counts(&self) -> Result<BTreeMap<String, u64>> {
        let mut counts = BTreeMap::new();
        let mut offset: u64 = 0;
        loop {
            let range = format!("{}-{}", offset, offset + SCAN_PAGE_SIZE - 1);
            let response = self
                .authed(self.client.get(self.rest_url("posts")))
                .header("Range-Unit", "items")
                .header("Range", &range)
                .query(&[("select", "category")])
                .send()
                .await
                .map_err(|e| PipelineError::Persistence(format!("category scan: {e}")))?;

            // PostgREST signals a past-the-end range with 416.
            if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
                break;
            }
            let response =
                require_success(response, "category scan", PipelineError::Persistence).await?;
            let rows: Vec<CategoryRow> = response
                .json()
                .await
                .map_err(|e| PipelineError::Persistence(format!("category scan: {e}")))?;

            let page_len = rows.len() as u64;
            for row in rows {
                *counts.entry(row.category).or_insert(0) += 1;
            }
            if page_len < SCAN_PAGE_SIZE {
                break;
            }
            offset += SCAN_PAGE_SIZE;
        }
        debug!(categories = counts.len(), "Scanned stored category counts");
        Ok(counts)
    }

    async fn title_exists(&self, title: &str) -> Result<bool> {
        let filter = format!("eq.{title}");
        let response = self
            .authed(self.client.get(self.rest_url("posts")))
            .query(&[
                ("select", "id"),
                ("title", filter.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::Persistence(format!("title lookup: {e}")))?;
        let response =
            require_success(response, "title lookup", PipelineError::Persistence).await?;
        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| PipelineError::Persistence(format!("title lookup: {e}")))?;
        Ok(!rows.is_empty())
    }

    #[instrument(level = "info", skip_all, fields(category = %post.category))]
    async fn insert_post(&self, post: &StoredPost) -> Result<String> {
        let response = self
            .authed(self.client.post(self.rest_url("posts")))
            .header("Prefer", "return=representation")
            .json(post)
            .send()
            .await
            .map_err(|e| PipelineError::Persistence(format!("post insert: {e}")))?;
        let response =
            require_success(response, "post insert", PipelineError::Persistence).await?;
        let rows: Vec<InsertedRow> = response
            .json()
            .await
            .map_err(|e| PipelineError::Persistence(format!("post insert: {e}")))?;
        match rows.into_iter().next() {
            Some(row) => {
                info!(post_id = %row.id, "Inserted post");
                Ok(row.id)
            }
            None => Err(PipelineError::Persistence(
                "post insert returned no representation".to_string(),
            )),
        }
    }

    #[instrument(level = "info", skip_all, fields(path = %object_path))]
    async fn store_image(&self, source_url: &str, object_path: &str) -> Result<String> {
        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| PipelineError::Image(format!("image download: {e}")))?;
        let response = require_success(response, "image download", PipelineError::Image).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Image(format!("image download: {e}")))?;

        let upload_url = format!(
            "{}/storage/v1/object/{}/{object_path}",
            self.base_url, self.bucket
        );
        let response = self
            .authed(self.client.post(&upload_url))
            .header("Content-Type", "image/jpeg")
            .body(bytes)
            .send()
            .await
            .map_err(|e| PipelineError::Image(format!("image upload: {e}")))?;
        require_success(response, "image upload", PipelineError::Image).await?;

        info!("Stored image");
        Ok(self.public_object_url(object_path))
    }

    async fn mirror_count(&self, month_key: &str) -> Result<u64> {
        let filter = format!("eq.{month_key}");
        let response = self
            .authed(self.client.get(self.rest_url("mirror_counters")))
            .query(&[("select", "posts"), ("month_key", filter.as_str())])
            .send()
            .await
            .map_err(|e| PipelineError::Persistence(format!("mirror counter read: {e}")))?;
        let response =
            require_success(response, "mirror counter read", PipelineError::Persistence).await?;
        let rows: Vec<CounterRow> = response
            .json()
            .await
            .map_err(|e| PipelineError::Persistence(format!("mirror counter read: {e}")))?;
        Ok(rows.first().map(|row| row.posts).unwrap_or(0))
    }

    async fn bump_mirror_count(&self, month_key: &str) -> Result<()> {
        let response = self
            .authed(self.client.post(self.rest_url("rpc/increment_mirror_count")))
            .json(&json!({ "p_month_key": month_key }))
            .send()
            .await
            .map_err(|e| PipelineError::Persistence(format!("mirror counter bump: {e}")))?;
        require_success(response, "mirror counter bump", PipelineError::Persistence).await?;
        debug!(month_key, "Bumped mirror counter");
        Ok(())
    }
}
