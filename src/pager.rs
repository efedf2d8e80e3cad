use crate::backoff::fetch_with_retry;
use crate::config::RunConfig;
use crate::debug_html;
use crate::fetch::{FetchError, Fetcher};
use crate::formats::{CompanyRecord, ReviewRecord};
use crate::pacing::{Pacer, PauseReason};
use crate::parse::{ParsedReview, ReviewParser};
use crate::platform::{FetchStrategy, Platform};

#[derive(Debug, Clone, PartialEq)]
pub enum PagerOutcome {
    /// At least the first page was fetched and parsed.
    Collected {
        reviews: Vec<ReviewRecord>,
        pages: u32,
    },
    /// The first page could not be fetched or held no reviews.
    Failed { url: String, error: String },
}

/// Walks the pages of one company on one platform.
pub struct Pager<'a> {
    pub config: &'a RunConfig,
    pub parser: &'a ReviewParser,
    pub pacer: &'a dyn Pacer,
}

impl Pager<'_> {
    pub async fn scrape(
        &self,
        fetcher: &dyn Fetcher,
        company: &CompanyRecord,
        platform: Platform,
        base_url: &str,
    ) -> PagerOutcome {
        let max_pages = self.config.page_limits.for_platform(platform);
        let max_reviews = self.config.max_reviews_per_company;
        let page_urls = platform.page_urls(base_url, max_pages);
        let company_name = company.company_name.as_str();

        let mut reviews: Vec<ReviewRecord> = Vec::new();
        let mut pages = 0u32;

        for (index, url) in page_urls.iter().enumerate() {
            let page = index as u32 + 1;
            if reviews.len() >= max_reviews {
                tracing::info!(company = company_name, %platform, max_reviews, "review cap reached");
                break;
            }
            if page > 1 {
                self.pacer
                    .pause(self.config.page_delay.sample(), PauseReason::BetweenPages)
                    .await;
            }

            tracing::info!(company = company_name, %platform, page, url = %url, "fetching page");
            let html =
                match fetch_with_retry(fetcher, self.pacer, &self.config.retry, url, platform).await
                {
                    Ok(html) => html,
                    Err(err) if page == 1 => {
                        return PagerOutcome::Failed {
                            url: url.clone(),
                            error: err.to_string(),
                        };
                    }
                    Err(FetchError::NotFound) => {
                        tracing::info!(company = company_name, %platform, page, "page not found; end of reviews");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(company = company_name, %platform, page, error = %err, "page failed; stopping pagination");
                        break;
                    }
                };

            let report = self
                .parser
                .parse(platform, &html, max_reviews - reviews.len());
            tracing::info!(
                company = company_name,
                %platform,
                page,
                found = report.found,
                parsed = report.reviews.len(),
                dropped = report.dropped(),
                "parsed page"
            );

            if report.reviews.is_empty() {
                self.dump_page(company_name, platform, url, &html);
                if page == 1 {
                    return PagerOutcome::Failed {
                        url: url.clone(),
                        error: "no reviews parsed".to_owned(),
                    };
                }
                tracing::info!(company = company_name, %platform, page, "no more reviews");
                break;
            }

            pages += 1;
            let scraped_at = chrono::Utc::now().to_rfc3339();
            reviews.extend(
                report
                    .reviews
                    .into_iter()
                    .map(|parsed| to_record(company, platform, base_url, page, &scraped_at, parsed)),
            );
        }

        PagerOutcome::Collected { reviews, pages }
    }

    fn dump_page(&self, company: &str, platform: Platform, url: &str, html: &str) {
        if platform.strategy() != FetchStrategy::Api {
            return;
        }
        let Some(dir) = self.config.debug_html_dir.as_deref() else {
            return;
        };
        match debug_html::write_dump(dir, company, url, html) {
            Ok(path) => tracing::info!(company, %platform, path = %path.display(), "saved debug html"),
            Err(err) => tracing::warn!(company, %platform, ?err, "failed to save debug html"),
        }
    }
}

fn to_record(
    company: &CompanyRecord,
    platform: Platform,
    base_url: &str,
    page: u32,
    scraped_at: &str,
    parsed: ParsedReview,
) -> ReviewRecord {
    ReviewRecord {
        company_name: company.company_name.clone(),
        location: company.location.clone(),
        platform,
        url: base_url.to_owned(),
        topic: parsed.topic,
        text: parsed.text,
        rating: parsed.rating,
        date: parsed.date,
        page,
        scraped_at: scraped_at.to_owned(),
        method: parsed.method,
    }
}
