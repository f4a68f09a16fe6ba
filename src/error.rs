//! Error taxonomy for the pipeline.
//!
//! One variant per failure class, so logs and call sites can tell a fatal
//! persistence problem from a skippable image problem. Classification
//! happens at the call site with `map_err`; there are no blanket `From`
//! impls, since the same underlying error type (a failed HTTP request, say)
//! belongs to different classes depending on the subsystem it came from.
//!
//! # Fatality
//!
//! | Class | Fatal for the run? |
//! |---|---|
//! | [`Configuration`](PipelineError::Configuration) | yes, before any external call |
//! | [`SourceFetch`](PipelineError::SourceFetch) | no, the feed contributes nothing |
//! | [`Generation`](PipelineError::Generation) | yes |
//! | [`Image`](PipelineError::Image) | no, the post goes out without an image |
//! | [`Persistence`](PipelineError::Persistence) | yes for count scan and insert, no inside mirror accounting |
//! | [`Mirror`](PipelineError::Mirror) | no |

use thiserror::Error;

/// Failure classes the pipeline distinguishes.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or missing configuration. Raised before any external call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A single feed could not be fetched or parsed.
    #[error("feed fetch failed: {0}")]
    SourceFetch(String),

    /// The text-generation call failed or returned unusable output.
    #[error("article generation failed: {0}")]
    Generation(String),

    /// Image search, download, or upload failed.
    #[error("image handling failed: {0}")]
    Image(String),

    /// The document store rejected a read or write.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The mirror post could not be delivered.
    #[error("mirror post failed: {0}")]
    Mirror(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_class_and_detail() {
        let e = PipelineError::Configuration("categories table is empty".into());
        assert_eq!(
            e.to_string(),
            "configuration error: categories table is empty"
        );

        let e = PipelineError::SourceFetch("https://example.com/rss: timeout".into());
        assert!(e.to_string().starts_with("feed fetch failed: "));

        let e = PipelineError::Mirror("429 Too Many Requests".into());
        assert_eq!(e.to_string(), "mirror post failed: 429 Too Many Requests");
    }
}
