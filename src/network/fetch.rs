use super::PageFetcher;
use crate::error::{LookupFailed, LookupResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Single GET of the submitted page. Invalid certificates are accepted and
/// at most `max_bytes` of the body are kept.
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str, max_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }

    fn failed(&self, e: reqwest::Error) -> LookupFailed {
        if e.is_timeout() {
            LookupFailed::Timeout {
                lookup: "fetch",
                after: self.timeout,
            }
        } else {
            LookupFailed::transport("fetch", e)
        }
    }
}

/// Append as much of `chunk` as fits under `max`. Returns true once full.
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], max: usize) -> bool {
    let room = max.saturating_sub(body.len());
    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
    body.len() >= max
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> LookupResult<String> {
        log::debug!("Fetching page {url}");
        let mut response = self.client.get(url).send().await.map_err(|e| self.failed(e))?;

        // Error pages are still analyzed.
        let status = response.status();
        if !status.is_success() {
            log::debug!("Page {url} answered {status}");
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.failed(e))? {
            if append_capped(&mut body, &chunk, self.max_bytes) {
                log::debug!("Page {url} truncated at {} bytes", self.max_bytes);
                break;
            }
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
