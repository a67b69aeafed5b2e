//! Best-effort network lookups. Every lookup reports `LookupResult`; turning a
//! failure into a feature value is left to the assembler.

pub mod dns;
pub mod fetch;
pub mod search_probe;
pub mod whois;

use crate::config::Config;
use crate::error::{LookupFailed, LookupResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

#[async_trait]
pub trait DnsLookup: Send + Sync {
    async fn resolve(&self, host: &str) -> LookupResult<Vec<IpAddr>>;
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Body of a single GET for `url`.
    async fn fetch(&self, url: &str) -> LookupResult<String>;
}

#[async_trait]
pub trait WhoisLookup: Send + Sync {
    async fn registration(&self, domain: &str) -> LookupResult<RegistrationDates>;
}

#[async_trait]
pub trait IndexProbe: Send + Sync {
    /// Whether a search engine reports any document for the domain.
    async fn is_indexed(&self, domain: &str) -> LookupResult<bool>;
}

/// Dates extracted from a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationDates {
    pub created: Option<NaiveDate>,
    pub expires: Option<NaiveDate>,
}

/// Raw outcome of every lookup for one URL. `None` means the lookup was not
/// attempted (disabled, IP literal, or DNS failed before the page fetch).
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkObservations {
    pub dns: LookupResult<Vec<IpAddr>>,
    pub page: Option<LookupResult<String>>,
    pub registration: Option<LookupResult<RegistrationDates>>,
    pub indexed: Option<LookupResult<bool>>,
}

/// Await `fut`, reporting a `lookup` timeout once `deadline` passes.
async fn until<T>(
    deadline: Option<(Instant, Duration)>,
    lookup: &'static str,
    fut: impl Future<Output = LookupResult<T>>,
) -> LookupResult<T> {
    match deadline {
        Some((at, after)) => timeout_at(at, fut)
            .await
            .unwrap_or(Err(LookupFailed::Timeout { lookup, after })),
        None => fut.await,
    }
}

/// Runs the lookups for one URL. DNS, WHOIS and the indexing probe run
/// concurrently; the page fetch waits for DNS and is skipped if it failed.
/// An overall budget cuts off only the lookups still running when it ends.
#[derive(Clone)]
pub struct NetworkResolver {
    dns: Arc<dyn DnsLookup>,
    fetcher: Arc<dyn PageFetcher>,
    whois: Option<Arc<dyn WhoisLookup>>,
    probe: Option<Arc<dyn IndexProbe>>,
}

impl NetworkResolver {
    pub fn new(
        dns: Arc<dyn DnsLookup>,
        fetcher: Arc<dyn PageFetcher>,
        whois: Option<Arc<dyn WhoisLookup>>,
        probe: Option<Arc<dyn IndexProbe>>,
    ) -> Self {
        Self {
            dns,
            fetcher,
            whois,
            probe,
        }
    }

    /// Live resolver built from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let dns = Arc::new(dns::SystemDns::new(Duration::from_secs(
            config.network.dns_timeout_seconds,
        ))?);
        let fetcher = Arc::new(fetch::HttpFetcher::new(
            Duration::from_secs(config.network.http_timeout_seconds),
            &config.network.user_agent,
            config.network.max_page_bytes,
        )?);

        let whois: Option<Arc<dyn WhoisLookup>> = if config.whois.enabled {
            Some(Arc::new(whois::WhoisClient::new(Duration::from_secs(
                config.whois.timeout_seconds,
            ))))
        } else {
            log::info!("WHOIS lookups disabled");
            None
        };

        let probe: Option<Arc<dyn IndexProbe>> = if config.search_probe.enabled {
            Some(Arc::new(search_probe::SearchIndexProbe::new(
                &config.search_probe,
                &config.network.user_agent,
            )?))
        } else {
            log::info!("Search indexing probe disabled");
            None
        };

        Ok(Self::new(dns, fetcher, whois, probe))
    }

    /// `host` is the ASCII hostname of `url`; `domain` is the registrable
    /// domain used for WHOIS and the probe, `None` for IP literals, which
    /// skips both.
    pub async fn resolve(
        &self,
        url: &str,
        host: &str,
        domain: Option<&str>,
        budget: Option<Duration>,
    ) -> NetworkObservations {
        let deadline = budget.map(|after| (Instant::now() + after, after));

        let dns_then_page = async {
            let dns = until(deadline, "dns", self.dns.resolve(host)).await;
            let page = match &dns {
                Ok(addrs) => {
                    log::debug!("{host} resolved to {} address(es)", addrs.len());
                    Some(until(deadline, "fetch", self.fetcher.fetch(url)).await)
                }
                Err(e) => {
                    log::warn!("DNS lookup failed for {host}: {e}, skipping page fetch");
                    None
                }
            };
            (dns, page)
        };

        let registration = async {
            match (&self.whois, domain) {
                (Some(whois), Some(domain)) => {
                    Some(until(deadline, "whois", whois.registration(domain)).await)
                }
                _ => None,
            }
        };

        let indexed = async {
            match (&self.probe, domain) {
                (Some(probe), Some(domain)) => {
                    Some(until(deadline, "search", probe.is_indexed(domain)).await)
                }
                _ => None,
            }
        };

        let ((dns, page), registration, indexed) = tokio::join!(dns_then_page, registration, indexed);

        if let Some(Err(e)) = &page {
            log::warn!("Page fetch failed for {url}: {e}");
        }
        if let Some(Err(e)) = &registration {
            log::warn!("WHOIS lookup failed for {host}: {e}");
        }
        if let Some(Err(e)) = &indexed {
            log::warn!("Search indexing probe failed for {host}: {e}");
        }

        NetworkObservations {
            dns,
            page,
            registration,
            indexed,
        }
    }
}
