use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use rand::Rng as _;
use serde::Deserialize;

use crate::cli::Cli;
use crate::platform::Platform;

pub const DEFAULT_COMPANIES_PATH: &str = "data/raw_reviews/all_reviews.json";
pub const DEFAULT_OUTPUT_PATH: &str = "data/raw_reviews/scraped_reviews.json";
pub const DEFAULT_FAILED_PATH: &str = "data/raw_reviews/failed_reviews.jsonl";
pub const DEFAULT_API_ENDPOINT: &str = "http://api.scraperapi.com";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

const MAX_NUMBERED_API_KEYS: usize = 4;

/// Inclusive range a randomized delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> anyhow::Result<Self> {
        if min > max {
            anyhow::bail!("delay range min ({min:?}) must not exceed max ({max:?})");
        }
        Ok(Self { min, max })
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, first try included.
    pub max_attempts: u32,
    pub http_base: Duration,
    pub http_step: Duration,
    /// Added on top of the HTTP delay for connection and rate-limit errors.
    pub connection_base: Duration,
    pub key_rotation_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            http_base: Duration::from_secs(10),
            http_step: Duration::from_secs(5),
            connection_base: Duration::from_secs(10),
            key_rotation_pause: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub glassdoor: u32,
    pub indeed: u32,
}

impl PageLimits {
    pub fn for_platform(&self, platform: Platform) -> u32 {
        match platform {
            Platform::Glassdoor => self.glassdoor,
            Platform::Indeed => self.indeed,
            Platform::Comparably | Platform::Kununu | Platform::AmbitionBox => 1,
        }
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            glassdoor: 5,
            indeed: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    pub enabled: bool,
    pub webdriver_url: String,
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub settle: Duration,
    pub scroll_rounds: u32,
    pub scroll_delay: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_owned(),
            headless: true,
            page_load_timeout: Duration::from_secs(60),
            settle: Duration::from_secs(12),
            scroll_rounds: 3,
            scroll_delay: Duration::from_secs(4),
        }
    }
}

/// Everything a run needs, fixed before the first request is made.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub companies_path: PathBuf,
    pub output_path: PathBuf,
    pub failed_path: PathBuf,
    pub key_state_path: PathBuf,
    pub debug_html_dir: Option<PathBuf>,

    pub api_keys: Vec<String>,
    pub api_endpoint: String,
    pub request_timeout: Duration,
    pub api_call_delay: Duration,

    pub platforms: Vec<Platform>,
    pub page_limits: PageLimits,
    pub max_reviews_per_company: usize,
    pub page_delay: DelayRange,
    pub company_delay: DelayRange,
    pub retry: RetryPolicy,
    pub browser: BrowserSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        let output_path = PathBuf::from(DEFAULT_OUTPUT_PATH);
        let data_dir = output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            companies_path: PathBuf::from(DEFAULT_COMPANIES_PATH),
            failed_path: PathBuf::from(DEFAULT_FAILED_PATH),
            key_state_path: data_dir.join("api_key_state.json"),
            debug_html_dir: Some(data_dir.join("debug_html")),
            output_path,
            api_keys: Vec::new(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_owned(),
            request_timeout: Duration::from_secs(120),
            api_call_delay: Duration::from_secs(2),
            platforms: Platform::ALL.to_vec(),
            page_limits: PageLimits::default(),
            max_reviews_per_company: 200,
            page_delay: DelayRange {
                min: Duration::from_secs(10),
                max: Duration::from_secs(15),
            },
            company_delay: DelayRange {
                min: Duration::from_secs(15),
                max: Duration::from_secs(20),
            },
            retry: RetryPolicy::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl RunConfig {
    /// Defaults, then the YAML file named by `--config`, then CLI flags, then
    /// the environment.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = match cli.config.as_deref() {
            Some(path) => Some(ConfigFile::read(Path::new(path))?),
            None => None,
        };
        let mut config = Self::from_sources(cli, file)?;
        config.api_keys = api_keys_from_env();
        if let Ok(url) = std::env::var("REVIEWSCRAPE_WEBDRIVER_URL")
            && !url.trim().is_empty()
        {
            config.browser.webdriver_url = url.trim().to_owned();
        }
        Ok(config)
    }

    pub fn from_sources(cli: &Cli, file: Option<ConfigFile>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(file) = file {
            file.apply(&mut config).context("apply config file")?;
        }

        if let Some(path) = cli.companies.as_deref() {
            config.companies_path = PathBuf::from(path);
        }
        if let Some(path) = cli.out.as_deref() {
            config.set_output_path(PathBuf::from(path));
        }
        if let Some(path) = cli.failed.as_deref() {
            config.failed_path = PathBuf::from(path);
        }
        if !cli.platforms.is_empty() {
            config.platforms = dedup_platforms(&cli.platforms);
        }
        if let Some(max_pages) = cli.max_pages {
            config.page_limits = PageLimits {
                glassdoor: max_pages,
                indeed: max_pages,
            };
        }
        if let Some(endpoint) = cli.api_endpoint.as_deref() {
            config.api_endpoint = endpoint.trim_end_matches('/').to_owned();
        }
        if cli.no_browser {
            config.browser.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }

    /// Moves the output file and the files kept next to it.
    pub fn set_output_path(&mut self, path: PathBuf) {
        let data_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.key_state_path = data_dir.join("api_key_state.json");
        if self.debug_html_dir.is_some() {
            self.debug_html_dir = Some(data_dir.join("debug_html"));
        }
        self.output_path = path;
    }

    pub fn api_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be > 0");
        }
        if self.platforms.is_empty() {
            anyhow::bail!("at least one platform must be enabled");
        }
        if self.api_endpoint.trim().is_empty() {
            anyhow::bail!("api endpoint is empty");
        }
        Ok(())
    }
}

fn dedup_platforms(platforms: &[Platform]) -> Vec<Platform> {
    let mut out = Vec::with_capacity(platforms.len());
    for platform in platforms {
        if !out.contains(platform) {
            out.push(*platform);
        }
    }
    out
}

/// `SCRAPERAPI_KEY_1` .. `SCRAPERAPI_KEY_4`, or `SCRAPERAPI_KEY` when none of
/// the numbered keys is set.
pub fn api_keys_from_env() -> Vec<String> {
    let numbered = (1..=MAX_NUMBERED_API_KEYS)
        .filter_map(|i| std::env::var(format!("SCRAPERAPI_KEY_{i}")).ok())
        .collect::<Vec<_>>();
    let single = std::env::var("SCRAPERAPI_KEY").ok();
    collect_api_keys(numbered, single)
}

fn collect_api_keys(numbered: Vec<String>, single: Option<String>) -> Vec<String> {
    let keys = numbered
        .into_iter()
        .map(|key| key.trim().to_owned())
        .filter(|key| !key.is_empty())
        .collect::<Vec<_>>();
    if !keys.is_empty() {
        return keys;
    }
    single
        .map(|key| key.trim().to_owned())
        .filter(|key| !key.is_empty())
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub companies: Option<String>,
    pub out: Option<String>,
    pub failed: Option<String>,
    pub debug_html: Option<bool>,
    pub platforms: Option<Vec<Platform>>,
    pub api_endpoint: Option<String>,
    pub request_timeout_secs: Option<f64>,
    pub api_call_delay_secs: Option<f64>,
    pub max_pages: Option<PageLimitsFile>,
    pub max_reviews_per_company: Option<usize>,
    pub page_delay_secs: Option<[f64; 2]>,
    pub company_delay_secs: Option<[f64; 2]>,
    pub retry: Option<RetryFile>,
    pub browser: Option<BrowserFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageLimitsFile {
    pub glassdoor: Option<u32>,
    pub indeed: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryFile {
    pub max_attempts: Option<u32>,
    pub http_base_secs: Option<f64>,
    pub http_step_secs: Option<f64>,
    pub connection_base_secs: Option<f64>,
    pub key_rotation_pause_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserFile {
    pub enabled: Option<bool>,
    pub webdriver_url: Option<String>,
    pub headless: Option<bool>,
    pub page_load_timeout_secs: Option<f64>,
    pub settle_secs: Option<f64>,
    pub scroll_rounds: Option<u32>,
    pub scroll_delay_secs: Option<f64>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parse config file: {}", path.display()))
    }

    fn apply(self, config: &mut RunConfig) -> anyhow::Result<()> {
        if let Some(path) = self.companies {
            config.companies_path = PathBuf::from(path);
        }
        if let Some(path) = self.out {
            config.set_output_path(PathBuf::from(path));
        }
        if let Some(path) = self.failed {
            config.failed_path = PathBuf::from(path);
        }
        if let Some(false) = self.debug_html {
            config.debug_html_dir = None;
        }
        if let Some(platforms) = self.platforms {
            config.platforms = dedup_platforms(&platforms);
        }
        if let Some(endpoint) = self.api_endpoint {
            config.api_endpoint = endpoint.trim_end_matches('/').to_owned();
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = secs_to_duration("request_timeout_secs", secs)?;
        }
        if let Some(secs) = self.api_call_delay_secs {
            config.api_call_delay = secs_to_duration("api_call_delay_secs", secs)?;
        }
        if let Some(limits) = self.max_pages {
            if let Some(pages) = limits.glassdoor {
                config.page_limits.glassdoor = pages;
            }
            if let Some(pages) = limits.indeed {
                config.page_limits.indeed = pages;
            }
        }
        if let Some(max) = self.max_reviews_per_company {
            config.max_reviews_per_company = max;
        }
        if let Some(range) = self.page_delay_secs {
            config.page_delay = range_from_secs("page_delay_secs", range)?;
        }
        if let Some(range) = self.company_delay_secs {
            config.company_delay = range_from_secs("company_delay_secs", range)?;
        }
        if let Some(retry) = self.retry {
            let policy = &mut config.retry;
            if let Some(max_attempts) = retry.max_attempts {
                policy.max_attempts = max_attempts;
            }
            if let Some(secs) = retry.http_base_secs {
                policy.http_base = secs_to_duration("retry.http_base_secs", secs)?;
            }
            if let Some(secs) = retry.http_step_secs {
                policy.http_step = secs_to_duration("retry.http_step_secs", secs)?;
            }
            if let Some(secs) = retry.connection_base_secs {
                policy.connection_base = secs_to_duration("retry.connection_base_secs", secs)?;
            }
            if let Some(secs) = retry.key_rotation_pause_secs {
                policy.key_rotation_pause =
                    secs_to_duration("retry.key_rotation_pause_secs", secs)?;
            }
        }
        if let Some(browser) = self.browser {
            let settings = &mut config.browser;
            if let Some(enabled) = browser.enabled {
                settings.enabled = enabled;
            }
            if let Some(url) = browser.webdriver_url {
                settings.webdriver_url = url;
            }
            if let Some(headless) = browser.headless {
                settings.headless = headless;
            }
            if let Some(secs) = browser.page_load_timeout_secs {
                settings.page_load_timeout =
                    secs_to_duration("browser.page_load_timeout_secs", secs)?;
            }
            if let Some(secs) = browser.settle_secs {
                settings.settle = secs_to_duration("browser.settle_secs", secs)?;
            }
            if let Some(rounds) = browser.scroll_rounds {
                settings.scroll_rounds = rounds;
            }
            if let Some(secs) = browser.scroll_delay_secs {
                settings.scroll_delay = secs_to_duration("browser.scroll_delay_secs", secs)?;
            }
        }
        Ok(())
    }
}

fn secs_to_duration(field: &str, secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|err| anyhow::anyhow!("{field} must be a non-negative number of seconds: {err}"))
}

fn range_from_secs(field: &str, [min, max]: [f64; 2]) -> anyhow::Result<DelayRange> {
    DelayRange::new(secs_to_duration(field, min)?, secs_to_duration(field, max)?)
        .with_context(|| format!("invalid {field}"))
}
