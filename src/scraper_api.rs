use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::config::RunConfig;
use crate::fetch::{FetchError, Fetcher, classify_status};
use crate::key_ring::KeyRing;
use crate::pacing::{Pacer, PauseReason};
use crate::platform::Platform;

/// Fetches pages through a ScraperAPI-compatible rendering proxy.
pub struct ScraperApiFetcher {
    client: reqwest::Client,
    endpoint: String,
    keys: Arc<KeyRing>,
    pacer: Arc<dyn Pacer>,
    api_call_delay: Duration,
    key_rotation_pause: Duration,
}

impl ScraperApiFetcher {
    pub fn new(config: &RunConfig, keys: Arc<KeyRing>, pacer: Arc<dyn Pacer>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("build rendering api http client")?;
        Ok(Self {
            client,
            endpoint: config.api_endpoint.trim_end_matches('/').to_owned(),
            keys,
            pacer,
            api_call_delay: config.api_call_delay,
            key_rotation_pause: config.retry.key_rotation_pause,
        })
    }
}

#[async_trait]
impl Fetcher for ScraperApiFetcher {
    async fn fetch(&self, url: &str, platform: Platform) -> Result<String, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::fatal(format!("invalid target url: {url}")));
        }
        let Some(api_key) = self.keys.current() else {
            return Err(FetchError::fatal("no rendering api keys available"));
        };

        tracing::debug!(%platform, url, "rendering api request");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("api_key", api_key.as_str()), ("url", url), ("render", "true")])
            .send()
            .await
            .map_err(|err| FetchError::connection(format!("rendering api request failed: {err}")))?;

        let status = response.status().as_u16();
        if status == 200 {
            let html = response
                .text()
                .await
                .map_err(|err| FetchError::connection(format!("read rendering api body: {err}")))?;
            tracing::debug!(%platform, url, bytes = html.len(), "rendering api success");
            self.pacer
                .pause(self.api_call_delay, PauseReason::AfterApiCall)
                .await;
            return Ok(html);
        }

        let err = classify_status(status);
        if status == 403 && self.keys.rotate("403_credits_exhausted") {
            self.pacer
                .pause(self.key_rotation_pause, PauseReason::KeyRotation)
                .await;
        }
        tracing::debug!(%platform, url, status, error = %err, "rendering api failure");
        Err(err)
    }
}
