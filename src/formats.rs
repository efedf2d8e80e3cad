use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// One entry of the input company list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub company_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub glassdoor_url: Option<String>,
    #[serde(default)]
    pub indeed_url: Option<String>,
    #[serde(default)]
    pub comparably_url: Option<String>,
    #[serde(default)]
    pub kununu_url: Option<String>,
    #[serde(default)]
    pub ambitionbox_url: Option<String>,
}

impl CompanyRecord {
    /// Base URL for `platform`, or `None` when missing or blank.
    pub fn url_for(&self, platform: Platform) -> Option<&str> {
        let url = match platform {
            Platform::Glassdoor => self.glassdoor_url.as_deref(),
            Platform::Indeed => self.indeed_url.as_deref(),
            Platform::Comparably => self.comparably_url.as_deref(),
            Platform::Kununu => self.kununu_url.as_deref(),
            Platform::AmbitionBox => self.ambitionbox_url.as_deref(),
        };
        url.map(str::trim).filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMethod {
    Scraperapi,
    ScraperapiFallback,
    Browser,
    BrowserPageText,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRecord {
    pub company_name: String,
    #[serde(default)]
    pub location: Option<String>,
    pub platform: Platform,
    pub url: String,
    #[serde(default)]
    pub topic: Option<String>,
    pub text: String,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub date: Option<String>,
    pub page: u32,
    pub scraped_at: String,
    pub method: ScrapeMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedScrape {
    pub company_name: String,
    pub platform: Platform,
    pub url: String,
    pub error: String,
    pub timestamp: String,
}
