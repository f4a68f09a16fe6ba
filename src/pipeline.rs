//! One end-to-end run: select a category, fetch candidates, draw one,
//! generate an article, illustrate it, store it, and maybe mirror it.
//!
//! The pipeline owns nothing but references; every effectful piece comes in
//! through a trait so the whole flow runs against fakes in tests. Generation
//! and persistence failures abort the run, image failures downgrade to a
//! text-only post, and mirror failures never touch the outcome.

use chrono::Utc;
use rand::Rng;
use tracing::{info, instrument, warn};

use crate::balance;
use crate::config::AppConfig;
use crate::error::Result;
use crate::feeds::CandidateSource;
use crate::generate::ArticleGenerator;
use crate::images::ImageSearcher;
use crate::mirror::{self, MessagePoster};
use crate::models::{ImageCredit, StoredPost};
use crate::store::ContentStore;
use crate::utils;

/// What a single run accomplished.
#[derive(Debug)]
pub enum RunOutcome {
    /// The selected category's feeds yielded nothing usable.
    NoCandidates { category: String },
    /// The drawn headline is already stored. The run stops rather than
    /// redraw; the next scheduled run gets a fresh pick.
    DuplicateTitle { category: String },
    /// A post was written.
    Published {
        category: String,
        title: String,
        post_id: String,
        mirrored: bool,
    },
}

/// Wires the pluggable pieces of one run together.
///
/// The image searcher and mirror poster are optional. A run without them
/// publishes text-only posts and never mirrors.
pub struct Pipeline<'a, S, C, G, I, P> {
    config: &'a AppConfig,
    store: &'a S,
    source: &'a C,
    generator: &'a G,
    images: Option<&'a I>,
    poster: Option<&'a P>,
}

impl<'a, S, C, G, I, P> Pipeline<'a, S, C, G, I, P>
where
    S: ContentStore,
    C: CandidateSource,
    G: ArticleGenerator,
    I: ImageSearcher,
    P: MessagePoster,
{
    pub fn new(
        config: &'a AppConfig,
        store: &'a S,
        source: &'a C,
        generator: &'a G,
        images: Option<&'a I>,
        poster: Option<&'a P>,
    ) -> Self {
        Self {
            config,
            store,
            source,
            generator,
            images,
            poster,
        }
    }

    /// Publish at most one post.
    #[instrument(level = "info", skip_all)]
    pub async fn run_once<R: Rng>(&self, rng: &mut R) -> Result<RunOutcome> {
        let counts = self.store.category_counts().await?;
        let category = balance::select_category(&counts, &self.config.categories)?;

        let candidates = self.source.fetch(category).await;
        if candidates.is_empty() {
            info!(category = %category.name, "No candidates this run");
            return Ok(RunOutcome::NoCandidates {
                category: category.name.clone(),
            });
        }

        let candidate = match balance::pick_and_dedup(&candidates, rng, self.store).await {
            Some(candidate) => candidate,
            // The list is non-empty here, so None means a duplicate draw.
            None => {
                return Ok(RunOutcome::DuplicateTitle {
                    category: category.name.clone(),
                });
            }
        };

        let article = self
            .generator
            .generate(&candidate.title, &candidate.category)
            .await?;

        let (image_url, image_credit) = match self.resolve_image(&article.keywords, rng).await {
            Some((url, credit)) => (Some(url), Some(credit)),
            None => (None, None),
        };

        let post = StoredPost {
            title: article.title,
            content: article.content,
            keywords: article.keywords,
            // Category provenance is the run's own selection, never model
            // output.
            category: candidate.category.clone(),
            image_url,
            image_credit,
            original_link: candidate.source_link.clone(),
            original_title: candidate.title.clone(),
            created_at: Utc::now(),
            views: 0,
            likes: 0,
            dislikes: 0,
        };

        let post_id = self.store.insert_post(&post).await?;
        info!(post_id = %post_id, title = %post.title, category = %post.category, "Stored post");

        let post_url = format!(
            "{}/post/{}",
            self.config.site_base_url.trim_end_matches('/'),
            post_id
        );
        let mirrored = mirror::maybe_mirror(
            &self.config.mirror,
            self.store,
            self.poster,
            &post.title,
            &post.category,
            &post_url,
            &utils::month_key(Utc::now()),
        )
        .await;

        Ok(RunOutcome::Published {
            category: post.category,
            title: post.title,
            post_id,
            mirrored,
        })
    }

    /// Find and re-host an illustration. Every failure downgrades to `None`;
    /// a post without an image is still a post.
    async fn resolve_image<R: Rng>(
        &self,
        keywords: &[String],
        rng: &mut R,
    ) -> Option<(String, ImageCredit)> {
        let searcher = self.images?;

        let candidate = match searcher.search(keywords).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                info!("No image found for keywords");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Image search failed; publishing without an image");
                return None;
            }
        };

        let object_path = format!(
            "posts/post_{}_{:08x}.jpg",
            Utc::now().timestamp_millis(),
            rng.random::<u32>()
        );
        match self.store.store_image(&candidate.url, &object_path).await {
            Ok(public_url) => Some((
                public_url,
                ImageCredit {
                    photographer: candidate.photographer,
                    photographer_url: candidate.photographer_url,
                },
            )),
            Err(e) => {
                warn!(error = %e, "Image re-hosting failed; publishing without an image");
                None
            }
        }
    }
}
