//! Data models for candidates, generated articles, and stored posts.
//!
//! This module defines the core data structures that flow through the
//! pipeline:
//! - [`CandidateItem`]: a headline pulled from a category's feeds
//! - [`GeneratedArticle`]: the validated output of the text-generation step
//! - [`ImageCandidate`] / [`ImageCredit`]: stock-image search results and
//!   the attribution that gets stored with a post
//! - [`StoredPost`]: the document written to the content store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single headline fetched from one of a category's feeds.
///
/// Candidates are ephemeral: they live for one run and are never persisted.
/// The `category` field is stamped by the fetcher from the category that was
/// selected for the run, never inferred from feed content.
#[derive(Debug, Clone)]
pub struct CandidateItem {
    /// The headline text, used verbatim for deduplication.
    pub title: String,
    /// Link to the original story.
    pub source_link: String,
    /// Publication instant, when the feed carried a parseable one.
    pub published_at: Option<DateTime<Utc>>,
    /// The category this candidate was fetched for.
    pub category: String,
}

/// The validated output of the text-generation step.
///
/// There is deliberately no category field here: the stored category always
/// comes from the selected candidate, and a model that echoes a category
/// back has no way to smuggle it into the post.
#[derive(Debug, Clone)]
pub struct GeneratedArticle {
    /// Rewritten headline.
    pub title: String,
    /// Article body in Markdown.
    pub content: String,
    /// Search keywords for the image step.
    pub keywords: Vec<String>,
}

/// One stock photo returned by the image search.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    /// Direct URL of the photo file at the image provider.
    pub url: String,
    /// Photographer name, for attribution.
    pub photographer: String,
    /// Photographer profile URL, for attribution.
    pub photographer_url: String,
}

/// Attribution stored alongside a post's image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageCredit {
    pub photographer: String,
    pub photographer_url: String,
}

/// The document inserted into the content store for each published post.
///
/// Image fields are omitted from the payload entirely when the image step
/// produced nothing. Engagement counters always start at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPost {
    pub title: String,
    /// Article body in Markdown.
    pub content: String,
    pub keywords: Vec<String>,
    /// Category of the candidate this post was generated from.
    pub category: String,
    /// Durable public URL in our own object storage, never the provider's.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_credit: Option<ImageCredit>,
    /// Link to the story the article was generated from.
    pub original_link: String,
    /// Headline of the story the article was generated from.
    pub original_title: String,
    pub created_at: DateTime<Utc>,
    pub views: u32,
    pub likes: u32,
    pub dislikes: u32,
}
