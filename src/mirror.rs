//! Quota-gated mirroring of published posts to X.
//!
//! Mirroring is strictly optional: every guard failure, compose failure,
//! and delivery failure degrades to "not mirrored" without touching the
//! run's outcome. The monthly counter is read before posting and bumped
//! only after the poster confirms delivery, so a failed delivery never
//! burns quota.

use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::config::MirrorConfig;
use crate::error::{PipelineError, Result};
use crate::store::ContentStore;
use crate::utils::truncate_for_log;

const X_POST_URL: &str = "https://api.x.com/2/tweets";

const ELLIPSIS: &str = "...";

/// Delivers one mirror message.
pub trait MessagePoster {
    async fn post_message(&self, text: &str) -> Result<()>;
}

/// Live X API v2 client (OAuth2 user-context bearer token).
pub struct XPoster {
    client: Client,
    access_token: String,
}

impl XPoster {
    pub fn new(client: Client, access_token: String) -> Self {
        Self {
            client,
            access_token,
        }
    }
}

impl MessagePoster for XPoster {
    #[instrument(level = "info", skip_all)]
    async fn post_message(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(X_POST_URL)
            .bearer_auth(&self.access_token)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| PipelineError::Mirror(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::Mirror(format!(
                "HTTP {status}: {}",
                truncate_for_log(&detail, 200)
            )));
        }
        info!("Posted mirror message");
        Ok(())
    }
}

/// Build the mirror message `"{title}\n\n#{category}\n{post_url}"` within a
/// character budget.
///
/// When the full message is over budget, only the title is shortened, to
/// exactly the remaining room including a trailing `"..."`; the category tag
/// and URL are never cut. Returns `None` when the tag, URL, and separators
/// leave no room for even one title character plus the ellipsis. Budgets and
/// lengths count characters, not bytes.
pub fn compose_message(
    title: &str,
    category: &str,
    post_url: &str,
    max_chars: usize,
) -> Option<String> {
    let tag = format!("#{category}");
    // "\n\n" between title and tag, "\n" between tag and URL.
    let separators = 3;
    let fixed = tag.chars().count() + post_url.chars().count() + separators;

    if title.chars().count() + fixed <= max_chars {
        return Some(format!("{title}\n\n{tag}\n{post_url}"));
    }

    let title_budget = max_chars.checked_sub(fixed)?;
    if title_budget < ELLIPSIS.len() + 1 {
        return None;
    }
    let shown: String = title.chars().take(title_budget - ELLIPSIS.len()).collect();
    Some(format!("{shown}{ELLIPSIS}\n\n{tag}\n{post_url}"))
}

/// Mirror a just-published post if every guard allows it.
///
/// Guards run in order: category eligibility, poster availability, monthly
/// quota. The quota read happens before any delivery attempt, and the
/// counter is bumped only after a confirmed delivery. A failed bump after a
/// confirmed delivery is logged and the mirror still counts as done, since
/// the message is already live.
///
/// Returns whether the post was mirrored.
#[instrument(level = "info", skip_all, fields(category = %category, month_key = %month_key))]
pub async fn maybe_mirror<S, P>(
    config: &MirrorConfig,
    store: &S,
    poster: Option<&P>,
    title: &str,
    category: &str,
    post_url: &str,
    month_key: &str,
) -> bool
where
    S: ContentStore,
    P: MessagePoster,
{
    if !config.categories.iter().any(|c| c == category) {
        debug!("Category is not mirrored");
        return false;
    }

    let poster = match poster {
        Some(p) => p,
        None => {
            info!("Mirror poster not configured; skipping");
            return false;
        }
    };

    let posted_this_month = match store.mirror_count(month_key).await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Cannot read mirror counter; skipping mirror");
            return false;
        }
    };
    if posted_this_month >= config.monthly_cap {
        info!(
            posted_this_month,
            cap = config.monthly_cap,
            "Monthly mirror cap reached; skipping"
        );
        return false;
    }

    let message = match compose_message(title, category, post_url, config.max_chars) {
        Some(m) => m,
        None => {
            warn!("Mirror message cannot fit the character budget; skipping");
            return false;
        }
    };

    match poster.post_message(&message).await {
        Ok(()) => {
            if let Err(e) = store.bump_mirror_count(month_key).await {
                warn!(error = %e, "Mirror posted but counter bump failed; month will under-count");
            }
            info!(chars = message.chars().count(), "Mirrored post");
            true
        }
        Err(e) => {
            warn!(error = %e, "Mirror post failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePoster, FakeStore};

    const URL: &str = "https://news.example.com/post/abcdef-123456";

    fn mirror_config(categories: &[&str]) -> MirrorConfig {
        MirrorConfig {
            categories: categories.iter().map(|c| c.to_string()).collect(),
            monthly_cap: 500,
            max_chars: 280,
        }
    }

    #[test]
    fn test_compose_short_title_unchanged() {
        let message = compose_message("Fed holds rates", "stocks", URL, 280).unwrap();
        assert_eq!(message, format!("Fed holds rates\n\n#stocks\n{URL}"));
    }

    #[test]
    fn test_compose_exact_fit_is_not_truncated() {
        let fixed = "#coin".chars().count() + URL.chars().count() + 3;
        let title = "t".repeat(280 - fixed);
        let message = compose_message(&title, "coin", URL, 280).unwrap();
        assert_eq!(message.chars().count(), 280);
        assert!(!message.contains(ELLIPSIS));
    }

    #[test]
    fn test_compose_truncates_title_to_exact_budget() {
        let title = "x".repeat(300);
        let message = compose_message(&title, "coin", URL, 280).unwrap();
        assert_eq!(message.chars().count(), 280);
        assert!(message.ends_with(&format!("\n\n#coin\n{URL}")));
        let title_part = message.split("\n\n").next().unwrap();
        assert!(title_part.ends_with(ELLIPSIS));
        assert!(title_part.starts_with("xxx"));
    }

    #[test]
    fn test_compose_counts_characters_not_bytes() {
        let title = "€".repeat(300);
        let message = compose_message(&title, "coin", URL, 280).unwrap();
        assert_eq!(message.chars().count(), 280);
    }

    #[test]
    fn test_compose_tag_and_url_never_cut() {
        let long_url = format!("https://news.example.com/post/{}", "a".repeat(200));
        let message = compose_message("Title", "stocks", &long_url, 280).unwrap();
        assert!(message.ends_with(&format!("\n\n#stocks\n{long_url}")));
    }

    #[test]
    fn test_compose_fixed_parts_over_budget_is_none() {
        assert_eq!(compose_message("Title", "stocks", URL, 20), None);
    }

    #[test]
    fn test_compose_no_room_for_any_title_is_none() {
        // tag(5) + url + separators(3) leaves 3 chars: ellipsis alone is
        // not a title.
        let budget = "#coin".chars().count() + URL.chars().count() + 3 + 3;
        assert_eq!(compose_message("Some title", "coin", URL, budget), None);
        // One more character is enough for "x...".
        assert!(compose_message("Some title", "coin", URL, budget + 1).is_some());
    }

    #[tokio::test]
    async fn test_mirror_skips_ineligible_category() {
        let store = FakeStore::default();
        let poster = FakePoster::default();
        let config = mirror_config(&["coin"]);
        let mirrored = maybe_mirror(
            &config, &store, Some(&poster), "T", "stocks", URL, "2025-07",
        )
        .await;
        assert!(!mirrored);
        assert!(poster.sent.lock().unwrap().is_empty());
        assert_eq!(*store.counter_reads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mirror_skips_without_poster() {
        let store = FakeStore::default();
        let config = mirror_config(&["coin"]);
        let mirrored = maybe_mirror(
            &config, &store, None::<&FakePoster>, "T", "coin", URL, "2025-07",
        )
        .await;
        assert!(!mirrored);
    }

    #[tokio::test]
    async fn test_mirror_respects_monthly_cap_without_posting() {
        let store = FakeStore::default();
        store
            .mirror_counts
            .lock()
            .unwrap()
            .insert("2025-07".to_string(), 500);
        let poster = FakePoster::default();
        let config = mirror_config(&["coin"]);
        let mirrored =
            maybe_mirror(&config, &store, Some(&poster), "T", "coin", URL, "2025-07").await;
        assert!(!mirrored);
        assert!(poster.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_posts_then_bumps_counter() {
        let store = FakeStore::default();
        store
            .mirror_counts
            .lock()
            .unwrap()
            .insert("2025-07".to_string(), 499);
        let poster = FakePoster::default();
        let config = mirror_config(&["coin"]);
        let mirrored =
            maybe_mirror(&config, &store, Some(&poster), "T", "coin", URL, "2025-07").await;
        assert!(mirrored);
        let sent = poster.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("#coin"));
        assert_eq!(store.mirror_counts.lock().unwrap()["2025-07"], 500);
    }

    #[tokio::test]
    async fn test_mirror_counter_read_failure_skips_post() {
        let store = FakeStore {
            fail_counter_read: true,
            ..FakeStore::default()
        };
        let poster = FakePoster::default();
        let config = mirror_config(&["coin"]);
        let mirrored =
            maybe_mirror(&config, &store, Some(&poster), "T", "coin", URL, "2025-07").await;
        assert!(!mirrored);
        assert!(poster.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_delivery_failure_leaves_counter_untouched() {
        let store = FakeStore::default();
        let poster = FakePoster {
            fail: true,
            ..FakePoster::default()
        };
        let config = mirror_config(&["coin"]);
        let mirrored =
            maybe_mirror(&config, &store, Some(&poster), "T", "coin", URL, "2025-07").await;
        assert!(!mirrored);
        assert!(store.mirror_counts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_bump_failure_still_counts_as_mirrored() {
        let store = FakeStore {
            fail_counter_bump: true,
            ..FakeStore::default()
        };
        let poster = FakePoster::default();
        let config = mirror_config(&["coin"]);
        let mirrored =
            maybe_mirror(&config, &store, Some(&poster), "T", "coin", URL, "2025-07").await;
        assert!(mirrored);
        assert_eq!(poster.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mirror_uncomposable_message_skips_post() {
        let store = FakeStore::default();
        let poster = FakePoster::default();
        let config = MirrorConfig {
            categories: vec!["coin".to_string()],
            monthly_cap: 500,
            max_chars: 10,
        };
        let mirrored =
            maybe_mirror(&config, &store, Some(&poster), "T", "coin", URL, "2025-07").await;
        assert!(!mirrored);
        assert!(poster.sent.lock().unwrap().is_empty());
    }
}
