use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::browser::BrowserFetcher;
use crate::cli::Cli;
use crate::config::RunConfig;
use crate::fetch::Fetcher;
use crate::formats::{CompanyRecord, FailedScrape};
use crate::key_ring::KeyRing;
use crate::pacing::{Pacer, PauseReason, TokioPacer};
use crate::pager::{Pager, PagerOutcome};
use crate::parse::ReviewParser;
use crate::platform::{FetchStrategy, Platform};
use crate::scraper_api::ScraperApiFetcher;
use crate::store::{FailureLog, ReviewStore};

/// One fetcher per strategy; `None` disables every platform using it.
#[derive(Clone, Default)]
pub struct Fetchers {
    pub api: Option<Arc<dyn Fetcher>>,
    pub browser: Option<Arc<dyn Fetcher>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoApiKey,
    BrowserDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOutcome {
    Scraped { reviews: usize, pages: u32 },
    Skipped(SkipReason),
    Failed(String),
    AlreadyScraped,
    NoUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairResult {
    pub company_name: String,
    pub platform: Platform,
    pub outcome: PlatformOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub companies: usize,
    pub results: Vec<PairResult>,
    pub new_reviews: usize,
    pub total_reviews: usize,
}

impl RunSummary {
    pub fn outcome(&self, company_name: &str, platform: Platform) -> Option<&PlatformOutcome> {
        self.results
            .iter()
            .find(|r| r.company_name == company_name && r.platform == platform)
            .map(|r| &r.outcome)
    }

    fn count(&self, matches: impl Fn(&PlatformOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| matches(&r.outcome)).count()
    }

    pub fn scraped(&self) -> usize {
        self.count(|o| matches!(o, PlatformOutcome::Scraped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PlatformOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PlatformOutcome::Skipped(_)))
    }

    pub fn already_scraped(&self) -> usize {
        self.count(|o| matches!(o, PlatformOutcome::AlreadyScraped))
    }

    pub fn log(&self) {
        tracing::info!(
            companies = self.companies,
            scraped = self.scraped(),
            failed = self.failed(),
            skipped = self.skipped(),
            already_scraped = self.already_scraped(),
            new_reviews = self.new_reviews,
            total_reviews = self.total_reviews,
            "run finished"
        );
    }
}

pub struct Pipeline {
    config: RunConfig,
    fetchers: Fetchers,
    pacer: Arc<dyn Pacer>,
    parser: ReviewParser,
}

impl Pipeline {
    pub fn new(config: RunConfig, fetchers: Fetchers, pacer: Arc<dyn Pacer>) -> anyhow::Result<Self> {
        let parser = ReviewParser::new().context("compile review selectors")?;
        Ok(Self {
            config,
            fetchers,
            pacer,
            parser,
        })
    }

    /// Scrapes every enabled platform of every company, one request at a time.
    ///
    /// Per-pair failures are recorded in `failures` and the run moves on.
    pub async fn run(
        &self,
        companies: &[CompanyRecord],
        store: &mut ReviewStore,
        failures: &FailureLog,
    ) -> RunSummary {
        let mut summary = RunSummary {
            companies: companies.len(),
            ..RunSummary::default()
        };
        self.warn_disabled_platforms();

        let pager = Pager {
            config: &self.config,
            parser: &self.parser,
            pacer: self.pacer.as_ref(),
        };
        let mut attempted_any = false;

        for (index, company) in companies.iter().enumerate() {
            let company_name = company.company_name.as_str();
            tracing::info!(company = company_name, index = index + 1, total = companies.len(), "company");

            for &platform in &self.config.platforms {
                let outcome = match self.select(company, platform, store) {
                    Err(outcome) => outcome,
                    Ok((fetcher, base_url)) => {
                        if attempted_any {
                            self.pacer
                                .pause(
                                    self.config.company_delay.sample(),
                                    PauseReason::BetweenCompanies,
                                )
                                .await;
                        }
                        attempted_any = true;

                        match pager.scrape(fetcher, company, platform, base_url).await {
                            PagerOutcome::Collected { reviews, pages } => {
                                let count = reviews.len();
                                summary.new_reviews += count;
                                if let Err(err) = store.append(reviews) {
                                    tracing::error!(company = company_name, %platform, ?err, "failed to save reviews");
                                }
                                tracing::info!(company = company_name, %platform, reviews = count, pages, "scraped");
                                PlatformOutcome::Scraped {
                                    reviews: count,
                                    pages,
                                }
                            }
                            PagerOutcome::Failed { url, error } => {
                                tracing::warn!(company = company_name, %platform, url = %url, error = %error, "scrape failed");
                                let failure = FailedScrape {
                                    company_name: company.company_name.clone(),
                                    platform,
                                    url,
                                    error: error.clone(),
                                    timestamp: chrono::Utc::now().to_rfc3339(),
                                };
                                if let Err(err) = failures.append(&failure) {
                                    tracing::error!(company = company_name, %platform, ?err, "failed to log failure");
                                }
                                PlatformOutcome::Failed(error)
                            }
                        }
                    }
                };

                summary.results.push(PairResult {
                    company_name: company.company_name.clone(),
                    platform,
                    outcome,
                });
            }
        }

        summary.total_reviews = store.len();
        summary
    }

    /// The fetcher and base URL for a pair, or the outcome when it is not
    /// scraped at all.
    fn select<'a>(
        &'a self,
        company: &'a CompanyRecord,
        platform: Platform,
        store: &ReviewStore,
    ) -> Result<(&'a dyn Fetcher, &'a str), PlatformOutcome> {
        let Some(base_url) = company.url_for(platform) else {
            tracing::debug!(company = %company.company_name, %platform, "no url");
            return Err(PlatformOutcome::NoUrl);
        };
        if store.already_scraped(&company.company_name, platform) {
            tracing::info!(company = %company.company_name, %platform, "already scraped; skipping");
            return Err(PlatformOutcome::AlreadyScraped);
        }
        let fetcher = match platform.strategy() {
            FetchStrategy::Api => self
                .fetchers
                .api
                .as_deref()
                .ok_or(PlatformOutcome::Skipped(SkipReason::NoApiKey))?,
            FetchStrategy::Browser => self
                .fetchers
                .browser
                .as_deref()
                .ok_or(PlatformOutcome::Skipped(SkipReason::BrowserDisabled))?,
        };
        Ok((fetcher, base_url))
    }

    fn warn_disabled_platforms(&self) {
        for strategy in [FetchStrategy::Api, FetchStrategy::Browser] {
            let disabled = match strategy {
                FetchStrategy::Api => self.fetchers.api.is_none(),
                FetchStrategy::Browser => self.fetchers.browser.is_none(),
            };
            let platforms = self
                .config
                .platforms
                .iter()
                .filter(|p| p.strategy() == strategy)
                .map(|p| p.as_str())
                .collect::<Vec<_>>();
            if disabled && !platforms.is_empty() {
                tracing::warn!(?strategy, platforms = %platforms.join(","), "platforms disabled for this run");
            }
        }
    }
}

pub fn load_companies(path: &Path) -> anyhow::Result<Vec<CompanyRecord>> {
    let raw = std::fs::read(path).with_context(|| format!("read companies: {}", path.display()))?;
    let companies: Vec<CompanyRecord> = serde_json::from_slice(&raw)
        .with_context(|| format!("parse companies: {}", path.display()))?;
    let total = companies.len();
    let companies = companies
        .into_iter()
        .filter(|c| !c.company_name.trim().is_empty())
        .collect::<Vec<_>>();
    if companies.len() < total {
        tracing::warn!(skipped = total - companies.len(), "ignoring companies without a name");
    }
    Ok(companies)
}

/// Builds the run from CLI flags and the environment, then scrapes.
pub async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    let config = RunConfig::load(&cli).context("load config")?;
    tracing::debug!(platforms = ?config.platforms, companies = %config.companies_path.display(), "loaded config");

    let companies = load_companies(&config.companies_path)?;
    let mut store = ReviewStore::open(&config.output_path).context("open review store")?;
    let failures = FailureLog::new(&config.failed_path);
    tracing::info!(
        companies = companies.len(),
        existing_reviews = store.len(),
        output = %store.path().display(),
        "starting run"
    );

    let pacer: Arc<dyn Pacer> = Arc::new(TokioPacer);
    let api = if config.api_enabled() {
        let keys = Arc::new(KeyRing::new(
            config.api_keys.clone(),
            Some(config.key_state_path.clone()),
        ));
        let status = keys.status();
        tracing::info!(
            total = status.total,
            active = status.active,
            current = status.current,
            "rendering api keys loaded"
        );
        let fetcher = ScraperApiFetcher::new(&config, keys, Arc::clone(&pacer))?;
        Some(Arc::new(fetcher) as Arc<dyn Fetcher>)
    } else {
        tracing::warn!("SCRAPERAPI_KEY not set; glassdoor and indeed are skipped");
        None
    };
    let browser = config.browser.enabled.then(|| {
        Arc::new(BrowserFetcher::new(config.browser.clone(), Arc::clone(&pacer))) as Arc<dyn Fetcher>
    });

    let pipeline = Pipeline::new(config, Fetchers { api, browser }, pacer)?;
    let summary = pipeline.run(&companies, &mut store, &failures).await;
    summary.log();
    Ok(summary)
}
