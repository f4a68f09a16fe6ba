//! Stock-image search via the Pexels API.
//!
//! Everything in this module is best-effort: the pipeline treats any error
//! or miss here as "publish without an image".

use itertools::Itertools;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::{PipelineError, Result};
use crate::models::ImageCandidate;

const PEXELS_SEARCH_URL: &str = "https://api.pexels.com/v1/search";
/// How many article keywords go into the search query.
const QUERY_KEYWORDS: usize = 3;
/// Result page size; one photo is drawn from this pool at random so repeated
/// posts on the same topic do not all carry the same picture.
const SEARCH_POOL_SIZE: u32 = 80;

/// Finds one stock photo for an article.
pub trait ImageSearcher {
    /// `Ok(None)` means the search worked but found nothing usable.
    async fn search(&self, keywords: &[String]) -> Result<Option<ImageCandidate>>;
}

/// Live Pexels client.
pub struct PexelsClient {
    client: Client,
    api_key: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    src: PhotoSrc,
    photographer: String,
    photographer_url: String,
}

#[derive(Deserialize)]
struct PhotoSrc {
    large: String,
}

impl PexelsClient {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

fn search_query(keywords: &[String]) -> String {
    keywords.iter().take(QUERY_KEYWORDS).join(" ")
}

impl ImageSearcher for PexelsClient {
    #[instrument(level = "info", skip_all)]
    async fn search(&self, keywords: &[String]) -> Result<Option<ImageCandidate>> {
        let query = search_query(keywords);
        if query.trim().is_empty() {
            return Ok(None);
        }

        let per_page = SEARCH_POOL_SIZE.to_string();
        let response = self
            .client
            .get(PEXELS_SEARCH_URL)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query.as_str()),
                ("per_page", per_page.as_str()),
                ("orientation", "landscape"),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::Image(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Image(format!(
                "search returned HTTP {status}"
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Image(format!("unreadable search response: {e}")))?;

        if parsed.photos.is_empty() {
            info!(%query, "No photos matched");
            return Ok(None);
        }

        let photo = &parsed.photos[rand::rng().random_range(0..parsed.photos.len())];
        info!(
            %query,
            pool = parsed.photos.len(),
            photographer = %photo.photographer,
            "Picked photo"
        );
        Ok(Some(ImageCandidate {
            url: photo.src.large.clone(),
            photographer: photo.photographer.clone(),
            photographer_url: photo.photographer_url.clone(),
        }))
    }
}
