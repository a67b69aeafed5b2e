use super::{RegistrationDates, WhoisLookup};
use crate::domain_utils::DomainUtils;
use crate::error::{LookupFailed, LookupResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const IANA_SERVER: &str = "whois.iana.org";
const FALLBACK_SERVERS: &[&str] = &["whois.iana.org", "whois.internic.net"];

const CREATION_PATTERNS: &[&str] = &[
    r"(?i)creation\s*date[:\s]+([^\r\n]+)",
    r"(?i)domain\s*created[:\s]+([^\r\n]+)",
    r"(?i)created\s*on[:\s]+([^\r\n]+)",
    r"(?i)created[:\s]+([^\r\n]+)",
    r"(?i)registration\s*date[:\s]+([^\r\n]+)",
    r"(?i)registration_time[:\s]+([^\r\n]+)",
    r"(?i)registered\s*on[:\s]+([^\r\n]+)",
    r"(?i)registered[:\s]+([^\r\n]+)",
    r"(?i)domain_date_created[:\s]+([^\r\n]+)",
    r"(?i)create_date[:\s]+([^\r\n]+)",
    r"(?i)created_date[:\s]+([^\r\n]+)",
];

const EXPIRATION_PATTERNS: &[&str] = &[
    r"(?i)registry\s*expiry\s*date[:\s]+([^\r\n]+)",
    r"(?i)registrar\s*registration\s*expiration\s*date[:\s]+([^\r\n]+)",
    r"(?i)expiration\s*date[:\s]+([^\r\n]+)",
    r"(?i)expiry\s*date[:\s]+([^\r\n]+)",
    r"(?i)expires\s*on[:\s]+([^\r\n]+)",
    r"(?i)expires[:\s]+([^\r\n]+)",
    r"(?i)paid-till[:\s]+([^\r\n]+)",
    r"(?i)expiration_time[:\s]+([^\r\n]+)",
];

fn compiled(patterns: &'static [&'static str], cell: &'static OnceLock<Vec<Regex>>) -> &'static [Regex] {
    cell.get_or_init(|| {
        patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::error!("Invalid WHOIS pattern {p}: {e}");
                    None
                }
            })
            .collect()
    })
}

fn creation_patterns() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    compiled(CREATION_PATTERNS, &CELL)
}

fn expiration_patterns() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    compiled(EXPIRATION_PATTERNS, &CELL)
}

fn refer_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"(?im)^\s*(?:refer|whois):\s*(\S+)").expect("static regex"))
}

/// Registry client speaking the plain-text WHOIS protocol on TCP port 43.
#[derive(Debug, Clone)]
pub struct WhoisClient {
    timeout: Duration,
    servers: HashMap<&'static str, &'static str>,
}

impl WhoisClient {
    pub fn new(timeout: Duration) -> Self {
        let servers = HashMap::from([
            ("com", "whois.verisign-grs.com"),
            ("net", "whois.verisign-grs.com"),
            ("org", "whois.pir.org"),
            ("info", "whois.afilias.net"),
            ("biz", "whois.neulevel.biz"),
            ("io", "whois.nic.io"),
            ("us", "whois.nic.us"),
            ("uk", "whois.nic.uk"),
            ("de", "whois.denic.de"),
            ("fr", "whois.afnic.fr"),
            ("it", "whois.nic.it"),
            ("nl", "whois.domain-registry.nl"),
            ("au", "whois.auda.org.au"),
            ("ca", "whois.cira.ca"),
            ("jp", "whois.jprs.jp"),
            ("cn", "whois.cnnic.cn"),
            ("ru", "whois.tcinet.ru"),
            ("br", "whois.registro.br"),
            ("mx", "whois.mx"),
            ("tk", "whois.dot.tk"),
            ("ml", "whois.dot.ml"),
            ("ga", "whois.dot.ga"),
            ("cf", "whois.dot.cf"),
        ]);
        Self { timeout, servers }
    }

    fn server_for(&self, domain: &str) -> &'static str {
        self.servers
            .get(DomainUtils::tld(domain))
            .copied()
            .unwrap_or(IANA_SERVER)
    }

    async fn query(&self, server: &str, domain: &str) -> LookupResult<String> {
        log::debug!("Connecting to WHOIS server: {server}:43");

        let mut stream = timeout(self.timeout, TcpStream::connect(format!("{server}:43")))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| LookupFailed::transport("whois", e))?;

        stream
            .write_all(format!("{domain}\r\n").as_bytes())
            .await
            .map_err(|e| LookupFailed::transport("whois", e))?;

        let mut raw = Vec::new();
        timeout(self.timeout, stream.read_to_end(&mut raw))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| LookupFailed::transport("whois", e))?;

        let response = String::from_utf8_lossy(&raw).into_owned();
        if response.trim().is_empty() {
            return Err(LookupFailed::no_data("whois", format!("empty response from {server}")));
        }
        Ok(response)
    }

    fn timed_out(&self) -> LookupFailed {
        LookupFailed::Timeout {
            lookup: "whois",
            after: self.timeout,
        }
    }

    /// Query `server`, following one IANA-style `refer:` hop.
    async fn query_with_referral(&self, server: &str, domain: &str) -> LookupResult<RegistrationDates> {
        let text = self.query(server, domain).await?;
        let dates = parse_registration(&text);
        if dates.created.is_some() {
            return Ok(dates);
        }

        if let Some(referral) = referral_server(&text) {
            if !referral.eq_ignore_ascii_case(server) {
                log::debug!("WHOIS server {server} referred {domain} to {referral}");
                let text = self.query(&referral, domain).await?;
                return with_creation(parse_registration(&text), domain);
            }
        }

        with_creation(dates, domain)
    }
}

#[async_trait]
impl WhoisLookup for WhoisClient {
    async fn registration(&self, domain: &str) -> LookupResult<RegistrationDates> {
        let root = DomainUtils::whois_root_domain(&domain.to_lowercase());
        if root.is_empty() || !root.contains('.') || root.contains(char::is_whitespace) {
            return Err(LookupFailed::no_data("whois", format!("invalid domain {root}")));
        }

        let server = self.server_for(&root);
        log::debug!("Using WHOIS server {server} for {root}");

        let primary_error = match self.query_with_referral(server, &root).await {
            Ok(dates) => return Ok(dates),
            Err(e) => e,
        };
        log::debug!("WHOIS query to {server} failed: {primary_error}");

        for fallback in FALLBACK_SERVERS.iter().filter(|s| **s != server) {
            log::debug!("Trying fallback WHOIS server: {fallback}");
            match self.query_with_referral(fallback, &root).await {
                Ok(dates) => return Ok(dates),
                Err(e) => log::debug!("Fallback server {fallback} failed: {e}"),
            }
        }

        Err(primary_error)
    }
}

fn with_creation(dates: RegistrationDates, domain: &str) -> LookupResult<RegistrationDates> {
    if dates.created.is_some() {
        Ok(dates)
    } else {
        Err(LookupFailed::no_data(
            "whois",
            format!("no creation date for {domain}"),
        ))
    }
}

fn referral_server(text: &str) -> Option<String> {
    refer_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_lowercase())
        .filter(|s| s.contains('.'))
}

/// Pull creation and expiration dates out of a WHOIS text record.
pub fn parse_registration(text: &str) -> RegistrationDates {
    RegistrationDates {
        created: first_date(text, creation_patterns()),
        expires: first_date(text, expiration_patterns()),
    }
}

fn first_date(text: &str, patterns: &[Regex]) -> Option<NaiveDate> {
    patterns.iter().find_map(|re| {
        re.captures_iter(text)
            .filter_map(|c| c.get(1))
            .find_map(|m| parse_date(m.as_str()))
    })
}

/// Parse the date formats registries commonly emit.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }

    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d-%b-%Y", "%d.%m.%Y", "%d/%m/%Y", "%Y%m%d",
    ];
    // Many registries append a time zone or comment after the date.
    let head = value.split_whitespace().next().unwrap_or(value);
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(head, format) {
            return Some(date);
        }
    }

    log::debug!("Could not parse WHOIS date '{value}'");
    None
}
