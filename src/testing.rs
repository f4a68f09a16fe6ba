//! In-memory fakes for the pipeline's effectful traits.
//!
//! Every fake records what was asked of it behind a `Mutex` and can be
//! switched into failure mode per method, so tests drive both the happy
//! paths and the degradation rules without any network.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::config::CategoryConfig;
use crate::error::{PipelineError, Result};
use crate::feeds::CandidateSource;
use crate::generate::ArticleGenerator;
use crate::images::ImageSearcher;
use crate::mirror::MessagePoster;
use crate::models::{CandidateItem, GeneratedArticle, ImageCandidate, StoredPost};
use crate::store::ContentStore;

/// In-memory [`ContentStore`] with per-method failure switches.
#[derive(Default)]
pub struct FakeStore {
    pub counts: Mutex<BTreeMap<String, u64>>,
    pub titles: Mutex<HashSet<String>>,
    pub title_lookups: Mutex<usize>,
    pub inserted: Mutex<Vec<StoredPost>>,
    pub mirror_counts: Mutex<BTreeMap<String, u64>>,
    pub counter_reads: Mutex<usize>,
    pub fail_counts: bool,
    pub fail_title_lookup: bool,
    pub fail_insert: bool,
    pub fail_image_store: bool,
    pub fail_counter_read: bool,
    pub fail_counter_bump: bool,
}

impl ContentStore for FakeStore {
    async fn category_counts(&self) -> Result<BTreeMap<String, u64>> {
        if self.fail_counts {
            return Err(PipelineError::Persistence("stubbed counts failure".into()));
        }
        Ok(self.counts.lock().unwrap().clone())
    }

    async fn title_exists(&self, title: &str) -> Result<bool> {
        *self.title_lookups.lock().unwrap() += 1;
        if self.fail_title_lookup {
            return Err(PipelineError::Persistence("stubbed lookup failure".into()));
        }
        Ok(self.titles.lock().unwrap().contains(title))
    }

    async fn insert_post(&self, post: &StoredPost) -> Result<String> {
        if self.fail_insert {
            return Err(PipelineError::Persistence("stubbed insert failure".into()));
        }
        let mut inserted = self.inserted.lock().unwrap();
        inserted.push(post.clone());
        Ok(format!("post-{}", inserted.len()))
    }

    async fn store_image(&self, _source_url: &str, object_path: &str) -> Result<String> {
        if self.fail_image_store {
            return Err(PipelineError::Image("stubbed upload failure".into()));
        }
        Ok(format!("https://cdn.test/{object_path}"))
    }

    async fn mirror_count(&self, month_key: &str) -> Result<u64> {
        *self.counter_reads.lock().unwrap() += 1;
        if self.fail_counter_read {
            return Err(PipelineError::Persistence(
                "stubbed counter read failure".into(),
            ));
        }
        Ok(self
            .mirror_counts
            .lock()
            .unwrap()
            .get(month_key)
            .copied()
            .unwrap_or(0))
    }

    async fn bump_mirror_count(&self, month_key: &str) -> Result<()> {
        if self.fail_counter_bump {
            return Err(PipelineError::Persistence(
                "stubbed counter bump failure".into(),
            ));
        }
        *self
            .mirror_counts
            .lock()
            .unwrap()
            .entry(month_key.to_string())
            .or_insert(0) += 1;
        Ok(())
    }
}

/// Candidate source that returns a canned list and records which categories
/// were fetched.
#[derive(Default)]
pub struct FakeSource {
    pub items: Vec<CandidateItem>,
    pub requested: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn with_items(items: Vec<CandidateItem>) -> Self {
        Self {
            items,
            requested: Mutex::new(Vec::new()),
        }
    }
}

impl CandidateSource for FakeSource {
    async fn fetch(&self, category: &CategoryConfig) -> Vec<CandidateItem> {
        self.requested.lock().unwrap().push(category.name.clone());
        self.items.clone()
    }
}

/// Generator that returns a canned article, or fails when none is set.
#[derive(Default)]
pub struct FakeGenerator {
    pub article: Option<GeneratedArticle>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeGenerator {
    pub fn returning(article: GeneratedArticle) -> Self {
        Self {
            article: Some(article),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ArticleGenerator for FakeGenerator {
    async fn generate(&self, source_title: &str, category: &str) -> Result<GeneratedArticle> {
        self.calls
            .lock()
            .unwrap()
            .push((source_title.to_string(), category.to_string()));
        match &self.article {
            Some(article) => Ok(article.clone()),
            None => Err(PipelineError::Generation(
                "stubbed generation failure".into(),
            )),
        }
    }
}

/// Image search that returns a canned candidate, nothing, or an error.
#[derive(Default)]
pub struct FakeImages {
    pub candidate: Option<ImageCandidate>,
    pub fail: bool,
}

impl ImageSearcher for FakeImages {
    async fn search(&self, _keywords: &[String]) -> Result<Option<ImageCandidate>> {
        if self.fail {
            return Err(PipelineError::Image("stubbed search failure".into()));
        }
        Ok(self.candidate.clone())
    }
}

/// Poster that records delivered messages.
#[derive(Default)]
pub struct FakePoster {
    pub sent: Mutex<Vec<String>>,
    pub fail: bool,
}

impl MessagePoster for FakePoster {
    async fn post_message(&self, text: &str) -> Result<()> {
        if self.fail {
            return Err(PipelineError::Mirror("stubbed delivery failure".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
