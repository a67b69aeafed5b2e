use super::DnsLookup;
use crate::error::{LookupFailed, LookupResult};
use anyhow::Context;
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::Duration;

/// A/AAAA lookups through the system resolver configuration.
pub struct SystemDns {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl SystemDns {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .context("Failed to create DNS resolver from system configuration")?;
        Ok(Self { resolver, timeout })
    }
}

#[async_trait]
impl DnsLookup for SystemDns {
    async fn resolve(&self, host: &str) -> LookupResult<Vec<IpAddr>> {
        // An IP literal needs no lookup.
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        if host.is_empty() {
            return Err(LookupFailed::no_data("dns", "empty hostname"));
        }

        log::debug!("Checking DNS for {host} (timeout: {:?})", self.timeout);
        match tokio::time::timeout(self.timeout, self.resolver.lookup_ip(host)).await {
            Ok(Ok(response)) => {
                let addrs: Vec<IpAddr> = response.iter().collect();
                if addrs.is_empty() {
                    Err(LookupFailed::no_data("dns", format!("no addresses for {host}")))
                } else {
                    for ip in addrs.iter().take(3) {
                        log::debug!("DNS found IP for {host}: {ip}");
                    }
                    Ok(addrs)
                }
            }
            Ok(Err(e)) => Err(LookupFailed::no_data("dns", e)),
            Err(_) => Err(LookupFailed::Timeout {
                lookup: "dns",
                after: self.timeout,
            }),
        }
    }
}
