use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom as _;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities as _;

use crate::config::BrowserSettings;
use crate::fetch::{FetchError, Fetcher};
use crate::pacing::{Pacer, PauseReason};
use crate::platform::Platform;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/121.0",
];

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// Loads pages directly in a fresh WebDriver session per call.
pub struct BrowserFetcher {
    settings: BrowserSettings,
    pacer: Arc<dyn Pacer>,
}

impl BrowserFetcher {
    pub fn new(settings: BrowserSettings, pacer: Arc<dyn Pacer>) -> Self {
        Self { settings, pacer }
    }

    async fn open_session(&self) -> WebDriverResult<WebDriver> {
        let mut caps = DesiredCapabilities::chrome();
        if self.settings.headless {
            caps.set_headless()?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--window-size=1920,1080")?;
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        caps.add_arg(&format!("--user-agent={user_agent}"))?;

        let driver = WebDriver::new(self.settings.webdriver_url.as_str(), caps).await?;
        driver
            .set_page_load_timeout(self.settings.page_load_timeout)
            .await?;
        Ok(driver)
    }

    async fn load(&self, driver: &WebDriver, url: &str) -> Result<String, FetchError> {
        driver
            .goto(url)
            .await
            .map_err(|err| FetchError::connection(format!("page load failed: {err}")))?;
        self.pacer
            .pause(self.settings.settle, PauseReason::PageSettle)
            .await;

        for _ in 0..self.settings.scroll_rounds {
            if let Err(err) = driver.execute(SCROLL_TO_BOTTOM, Vec::new()).await {
                tracing::debug!(url, ?err, "scroll failed");
                break;
            }
            self.pacer
                .pause(self.settings.scroll_delay, PauseReason::PageSettle)
                .await;
        }

        driver
            .source()
            .await
            .map_err(|err| FetchError::http(format!("read page source: {err}")))
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, platform: Platform) -> Result<String, FetchError> {
        tracing::debug!(%platform, url, webdriver = %self.settings.webdriver_url, "browser load");
        let driver = self.open_session().await.map_err(|err| {
            FetchError::fatal(format!(
                "could not start browser session at {}: {err}",
                self.settings.webdriver_url
            ))
        })?;

        let result = self.load(&driver, url).await;
        if let Err(err) = driver.quit().await {
            tracing::warn!(?err, "failed to close browser session");
        }
        result
    }
}
