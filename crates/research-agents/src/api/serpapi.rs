//! SerpApi Google News client

use super::{NewsSearch, RawArticle};
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use research_utils::{parsed_env, required_env};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const SERVICE: &str = "news-search";
const SERPAPI_URL: &str = "https://serpapi.com/search";
const DEFAULT_RATE_LIMIT: NonZeroU32 = NonZeroU32::MIN.saturating_add(29);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news_results: Vec<RawArticle>,
    #[serde(default)]
    error: Option<String>,
}

/// SerpApi client with a per-minute request quota
pub struct SerpApiClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: SharedRateLimiter,
}

impl SerpApiClient {
    /// Create a client allowing `rate_limit` requests per minute
    pub fn new(api_key: impl Into<String>, rate_limit: u32, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(DEFAULT_RATE_LIMIT));
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            base_url: SERPAPI_URL.to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Reads `SERPAPI_API_KEY` and optional `SERPAPI_RATE_LIMIT`
    /// (requests per minute, default 30)
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let rate = parsed_env::<u32>("SERPAPI_RATE_LIMIT")?.unwrap_or(DEFAULT_RATE_LIMIT.get());
        Self::new(required_env("SERPAPI_API_KEY")?, rate, timeout)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl NewsSearch for SerpApiClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, count: u32) -> Result<Vec<RawArticle>> {
        self.rate_limiter.until_ready().await;

        let count = count.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("engine", "google"),
                ("tbm", "nws"),
                ("num", count.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ResearchError::upstream(
                SERVICE,
                format!("SerpApi error {status}: {body}"),
            ));
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            ResearchError::upstream(SERVICE, format!("Failed to parse SerpApi response: {e}"))
        })?;

        if let Some(error) = parsed.error {
            // SerpApi reports "no results" as an error string
            if parsed.news_results.is_empty() && error.contains("hasn't returned any results") {
                return Ok(Vec::new());
            }
            return Err(ResearchError::upstream(SERVICE, error));
        }

        debug!("{} raw articles", parsed.news_results.len());
        Ok(parsed.news_results)
    }
}
