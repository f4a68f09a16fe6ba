//! The two balancing decisions: which category this run serves, and which
//! candidate headline survives the draw.
//!
//! Both functions are deterministic given their inputs (the draw takes the
//! RNG as a parameter), so the selection behavior is testable without any
//! network.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::config::CategoryConfig;
use crate::error::{PipelineError, Result};
use crate::models::CandidateItem;
use crate::store::ContentStore;

/// Pick the most under-served category.
///
/// Each configured category scores `stored_count / weight`; the smallest
/// score wins. A category with no stored posts scores zero. Ties keep the
/// earliest entry, so the configured order is the tie-break order. Counts
/// for categories absent from the table are ignored.
///
/// # Errors
///
/// [`PipelineError::Configuration`] when the category table is empty.
pub fn select_category<'a>(
    counts: &BTreeMap<String, u64>,
    categories: &'a [CategoryConfig],
) -> Result<&'a CategoryConfig> {
    let mut best: Option<(&CategoryConfig, f64)> = None;
    for category in categories {
        let count = counts.get(&category.name).copied().unwrap_or(0);
        let score = count as f64 / category.weight;
        debug!(
            category = %category.name,
            count,
            weight = category.weight,
            score,
            "Scored category"
        );
        match &best {
            Some((_, best_score)) if score >= *best_score => {}
            _ => best = Some((category, score)),
        }
    }

    match best {
        Some((category, score)) => {
            info!(category = %category.name, score, "Selected most under-served category");
            Ok(category)
        }
        None => Err(PipelineError::Configuration(
            "category table is empty".to_string(),
        )),
    }
}

/// Draw one candidate uniformly at random and probe the store for its title.
///
/// Returns `None` when the list is empty or the drawn title is already
/// stored; there is no second draw. A failed existence probe logs a warning
/// and lets the candidate through, so a flaky store read cannot block the
/// run.
#[instrument(level = "info", skip_all, fields(candidates = candidates.len()))]
pub async fn pick_and_dedup<'a, R, S>(
    candidates: &'a [CandidateItem],
    rng: &mut R,
    store: &S,
) -> Option<&'a CandidateItem>
where
    R: Rng,
    S: ContentStore,
{
    if candidates.is_empty() {
        return None;
    }
    let picked = &candidates[rng.random_range(0..candidates.len())];
    info!(title = %picked.title, link = %picked.source_link, "Drew candidate");

    match store.title_exists(&picked.title).await {
        Ok(true) => {
            info!(title = %picked.title, "Title already stored; giving up for this run");
            None
        }
        Ok(false) => Some(picked),
        Err(e) => {
            warn!(error = %e, title = %picked.title, "Title lookup failed; treating candidate as new");
            Some(picked)
        }
    }
}
