use clap::Parser;

use crate::platform::Platform;

/// Collect employee reviews for a list of companies.
///
/// Every flag is optional; running without arguments uses the defaults and
/// the `SCRAPERAPI_KEY*` environment variables.
#[derive(Debug, Clone, Default, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Input JSON array of companies.
    #[arg(long)]
    pub companies: Option<String>,

    /// Output JSON array of scraped reviews (appended to across runs).
    #[arg(long)]
    pub out: Option<String>,

    /// Output JSONL log of failed company/platform pairs.
    #[arg(long)]
    pub failed: Option<String>,

    /// YAML file overriding the tunable constants.
    #[arg(long)]
    pub config: Option<String>,

    /// Restrict the run to these platforms (repeatable).
    #[arg(long = "platform", value_enum)]
    pub platforms: Vec<Platform>,

    /// Maximum pages per company for paginated platforms.
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Base URL of the rendering API.
    #[arg(long)]
    pub api_endpoint: Option<String>,

    /// Skip the browser-backed platforms.
    #[arg(long)]
    pub no_browser: bool,
}
