//! Command-line interface definitions for Newsmill.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets arrive through flags or environment variables only, so the YAML
//! configuration file never holds credentials.

use clap::Parser;

/// Command-line arguments for the Newsmill pipeline.
///
/// The store and generator credentials are required at startup; the image
/// and mirror credentials are optional and switch those steps off when
/// absent.
///
/// # Examples
///
/// ```sh
/// # One run against the default config file, secrets from the environment
/// newsmill
///
/// # Explicit config path
/// newsmill -c ./config/newsmill.yaml
///
/// # Everything on the command line
/// newsmill --supabase-url https://xyz.supabase.co \
///          --supabase-service-key KEY --gemini-api-key KEY
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "NEWSMILL_CONFIG", default_value = "newsmill.yaml")]
    pub config: String,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase service-role key
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY")]
    pub supabase_service_key: Option<String>,

    /// Gemini API key for article generation
    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    /// Pexels API key (optional, enables post images)
    #[arg(long, env = "PEXELS_API_KEY")]
    pub pexels_api_key: Option<String>,

    /// X API access token (optional, enables mirror posts)
    #[arg(long, env = "X_ACCESS_TOKEN")]
    pub x_access_token: Option<String>,
}
