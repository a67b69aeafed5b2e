//! `site:` query against a public search endpoint.

use super::IndexProbe;
use crate::config::SearchProbeConfig;
use crate::error::{LookupFailed, LookupResult};
use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Marker the search endpoint prints when a query has no results.
pub const NOT_INDEXED_MARKER: &str = "did not match any documents";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Fixed-delay retry, applied to transport failures only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// `attempt` is 1-based.
    pub fn decide(&self, attempt: u32, error: &LookupFailed) -> RetryDecision {
        if attempt >= self.max_attempts || !error.is_transport() {
            RetryDecision::NoRetry
        } else {
            RetryDecision::RetryAfter(self.delay)
        }
    }
}

/// Run `op` until it succeeds or the policy says to stop.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> LookupResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = LookupResult<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => match policy.decide(attempt, &e) {
                RetryDecision::NoRetry => return Err(e),
                RetryDecision::RetryAfter(delay) => {
                    log::debug!("Attempt {attempt} failed: {e}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            },
        }
    }
}

pub struct SearchIndexProbe {
    client: Client,
    endpoint: Url,
    timeout: Duration,
    policy: RetryPolicy,
}

impl SearchIndexProbe {
    pub fn new(config: &SearchProbeConfig, user_agent: &str) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        let endpoint = Url::parse(&config.endpoint)?;
        Ok(Self {
            client,
            endpoint,
            timeout,
            policy: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                delay: Duration::from_secs(config.retry_delay_seconds),
            },
        })
    }

    fn query_url(&self, domain: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("q", &format!("site:{domain}"));
        url
    }

    async fn query_once(&self, url: &Url) -> LookupResult<bool> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                LookupFailed::Timeout {
                    lookup: "search",
                    after: self.timeout,
                }
            } else {
                LookupFailed::transport("search", e)
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(LookupFailed::transport("search", format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LookupFailed::transport("search", e))?;
        Ok(is_indexed_body(&body))
    }
}

pub fn is_indexed_body(body: &str) -> bool {
    !body.contains(NOT_INDEXED_MARKER)
}

#[async_trait]
impl IndexProbe for SearchIndexProbe {
    async fn is_indexed(&self, domain: &str) -> LookupResult<bool> {
        let url = self.query_url(domain);
        let url = &url;
        run_with_retry(&self.policy, move |attempt| {
            log::debug!("Search indexing probe for {domain}, attempt {attempt}");
            self.query_once(url)
        })
        .await
    }
}
