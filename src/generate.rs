//! Article generation through the Gemini REST API, plus the parser that
//! turns raw model output into a validated [`GeneratedArticle`].
//!
//! The trait seam exists so the pipeline can be driven by a fake in tests;
//! the live implementation is a single `generateContent` call with no
//! retries. A failure here fails the whole run.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{PipelineError, Result};
use crate::models::GeneratedArticle;
use crate::utils::truncate_for_log;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Turns a source headline into an original article.
pub trait ArticleGenerator {
    async fn generate(&self, source_title: &str, category: &str) -> Result<GeneratedArticle>;
}

/// Live Gemini client.
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

impl GeminiGenerator {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }

    fn prompt(source_title: &str, category: &str) -> String {
        format!(
            "You are a professional news writer. Write an original news article \
             inspired by this headline from the {category} beat: {source_title:?}\n\
             \n\
             Requirements:\n\
             - An original title of at most 80 characters. Do not copy the headline.\n\
             - A body of 600 to 900 words in Markdown, with short paragraphs and \
             subheadings where they help.\n\
             - Write in a neutral, factual register. No invented quotes.\n\
             \n\
             Respond with ONLY a JSON object in exactly this shape, with newlines \
             inside strings escaped as \\n:\n\
             {{\"title\": \"...\", \"content\": \"...\", \"keywords\": [\"five\", \"search\", \"keywords\", \"for\", \"images\"]}}"
        )
    }
}

impl ArticleGenerator for GeminiGenerator {
    #[instrument(level = "info", skip_all, fields(model = %self.model, category = %category))]
    async fn generate(&self, source_title: &str, category: &str) -> Result<GeneratedArticle> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Self::prompt(source_title, category),
                }],
            }],
        };

        let url = format!("{GEMINI_BASE_URL}/{}:generateContent", self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::Generation(format!(
                "HTTP {status}: {}",
                truncate_for_log(&detail, 200)
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Generation(format!("unreadable response body: {e}")))?;
        let raw = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                PipelineError::Generation("response carries no candidate text".to_string())
            })?;

        let article = parse_model_output(raw)?;
        info!(title = %article.title, keywords = article.keywords.len(), "Generated article");
        Ok(article)
    }
}

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?").expect("code fence pattern"));

#[derive(Deserialize)]
struct RawArticle {
    title: String,
    content: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Extract and validate the JSON article object from raw model output.
///
/// Models wrap their JSON in code fences or surround it with prose often
/// enough that a plain `serde_json::from_str` on the whole response is
/// hopeless. This strips any ``` fences, slices from the first `{` to the
/// last `}`, and only then parses. Unknown fields in the object (a
/// model-echoed category, for instance) are ignored.
///
/// # Errors
///
/// [`PipelineError::Generation`] when no JSON object can be located, the
/// object does not parse, or the parsed article has an empty title, empty
/// content, or no usable keyword. Messages carry a truncated preview of the
/// offending output.
pub fn parse_model_output(raw: &str) -> Result<GeneratedArticle> {
    let stripped = CODE_FENCE.replace_all(raw, "");

    let start = stripped.find('{');
    let end = stripped.rfind('}');
    let object = match (start, end) {
        (Some(start), Some(end)) if end > start => &stripped[start..=end],
        _ => {
            return Err(PipelineError::Generation(format!(
                "no JSON object in model output: {}",
                truncate_for_log(raw, 200)
            )));
        }
    };

    let parsed: RawArticle = serde_json::from_str(object).map_err(|e| {
        PipelineError::Generation(format!(
            "model output does not parse as an article ({e}): {}",
            truncate_for_log(object, 200)
        ))
    })?;

    let title = parsed.title.trim().to_string();
    let content = parsed.content.trim().to_string();
    let keywords: Vec<String> = parsed
        .keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    if title.is_empty() {
        return Err(PipelineError::Generation(
            "model output has an empty title".to_string(),
        ));
    }
    if content.is_empty() {
        return Err(PipelineError::Generation(
            "model output has empty content".to_string(),
        ));
    }
    if keywords.is_empty() {
        return Err(PipelineError::Generation(format!(
            "model output has no usable keywords: {}",
            truncate_for_log(raw, 200)
        )));
    }

    Ok(GeneratedArticle {
        title,
        content,
        keywords,
    })
}
