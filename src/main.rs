//! # Newsmill
//!
//! A category-balancing content pipeline that turns RSS headlines into
//! published articles. Each run picks the most under-served category,
//! pulls candidate headlines from that category's feeds, rewrites one of
//! them with Gemini, attaches a stock photo, stores the post in Supabase,
//! and optionally mirrors a link to X under a monthly quota.
//!
//! ## Features
//!
//! - Weighted category balancing driven by live post counts
//! - RSS and Atom feed ingestion with per-feed failure isolation
//! - Article generation through the Gemini API with strict output validation
//! - Stock photo search via Pexels, re-hosted into Supabase storage
//! - Optional mirror posts to X, capped per calendar month
//!
//! ## Usage
//!
//! ```sh
//! newsmill -c ./newsmill.yaml
//! ```
//!
//! ## Architecture
//!
//! Each invocation publishes at most one post:
//! 1. **Select**: score every category by stored-count over weight, keep the smallest
//! 2. **Fetch**: download the winning category's feeds, a few items each
//! 3. **Draw**: pick one candidate uniformly at random, drop it if its title is already stored
//! 4. **Generate**: rewrite the drawn headline into a full article
//! 5. **Publish**: attach an image when possible, insert the post, maybe mirror it

use std::error::Error;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod balance;
mod cli;
mod config;
mod error;
mod feeds;
mod generate;
mod images;
mod mirror;
mod models;
mod pipeline;
mod store;
#[cfg(test)]
mod testing;
mod utils;

use cli::Cli;
use error::PipelineError;
use feeds::RssCandidateSource;
use generate::GeminiGenerator;
use images::PexelsClient;
use mirror::XPoster;
use pipeline::{Pipeline, RunOutcome};
use store::SupabaseStore;

fn require_secret(value: Option<String>, name: &str) -> Result<String, PipelineError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PipelineError::Configuration(format!("{name} is not set"))),
    }
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsmill starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.config, "Parsed CLI arguments");

    // ---- Load and validate configuration ----
    let config = match config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config, error = %e, "Cannot load configuration");
            return Err(e.into());
        }
    };
    info!(
        path = %args.config,
        categories = config.categories.len(),
        "Loaded configuration"
    );

    // ---- Required secrets ----
    let supabase_url = require_secret(args.supabase_url, "SUPABASE_URL")?;
    let supabase_service_key =
        require_secret(args.supabase_service_key, "SUPABASE_SERVICE_ROLE_KEY")?;
    let gemini_api_key = require_secret(args.gemini_api_key, "GEMINI_API_KEY")?;

    // ---- Shared HTTP client ----
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .map_err(|e| PipelineError::Configuration(format!("cannot build HTTP client: {e}")))?;

    // ---- Wire the pipeline ----
    let store = SupabaseStore::new(
        client.clone(),
        &supabase_url,
        supabase_service_key,
        config.storage.bucket.clone(),
    );
    let source = RssCandidateSource::new(client.clone(), config.per_source_items);
    let generator = GeminiGenerator::new(
        client.clone(),
        gemini_api_key,
        config.generation.model.clone(),
    );

    let images = args
        .pexels_api_key
        .filter(|key| !key.trim().is_empty())
        .map(|key| PexelsClient::new(client.clone(), key));
    if images.is_none() {
        info!("No Pexels API key; posts will be published without images");
    }

    let poster = args
        .x_access_token
        .filter(|token| !token.trim().is_empty())
        .map(|token| XPoster::new(client.clone(), token));
    if poster.is_none() {
        info!("No X access token; mirror posting disabled");
    }

    let pipeline = Pipeline::new(
        &config,
        &store,
        &source,
        &generator,
        images.as_ref(),
        poster.as_ref(),
    );

    // ---- Run once ----
    let mut rng = rand::rng();
    match pipeline.run_once(&mut rng).await {
        Ok(RunOutcome::Published {
            category,
            title,
            post_id,
            mirrored,
        }) => {
            info!(%category, %title, %post_id, mirrored, "Run published a post");
        }
        Ok(RunOutcome::NoCandidates { category }) => {
            info!(%category, "Run ended without candidates");
        }
        Ok(RunOutcome::DuplicateTitle { category }) => {
            info!(%category, "Run ended on a duplicate headline");
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            return Err(e.into());
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
