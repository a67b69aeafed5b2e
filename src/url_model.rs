//! URL validation, normalization and component splitting.
//!
//! Components are split with the RFC 3986 appendix B expression rather than a
//! strict parser so that lexical extraction never fails, whatever the input.

use crate::error::PredictError;
use regex::Regex;
use std::sync::OnceLock;

fn url_like_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.\-]*://)?[^\s/]+\.[A-Za-z]{2,}.*$")
            .expect("static regex")
    })
}

fn ip_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:[A-Za-z][A-Za-z0-9+.\-]*://)?(?:\d{1,3}(?:\.\d{1,3}){3}|\[[0-9A-Fa-f:.]+\])(?::\d+)?(?:[/?#].*)?$",
        )
        .expect("static regex")
    })
}

fn scheme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("static regex"))
}

fn components_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:([^:/?#]+):)?(?://([^/?#]*))?([^?#]*)(?:\?([^#]*))?(?:#(.*))?$")
            .expect("static regex")
    })
}

/// Reject anything that does not look like a URL before any work is done.
pub fn validate(raw: &str) -> Result<&str, PredictError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PredictError::MalformedUrl("empty input".to_string()));
    }
    if url_like_regex().is_match(trimmed) || ip_url_regex().is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(PredictError::MalformedUrl(trimmed.to_string()))
    }
}

/// Prepend `https://` when no scheme is present, in any letter case. This
/// is the only rewrite ever applied to the submitted URL.
pub fn normalize(url: &str) -> String {
    if scheme_regex().is_match(url) {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedUrl {
    /// The full URL string the components were taken from.
    pub raw: String,
    pub scheme: String,
    /// Authority as written, including userinfo and port.
    pub netloc: String,
    /// Lower-cased host without brackets, userinfo or port.
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: String,
}

impl ParsedUrl {
    pub fn parse(url: &str) -> Self {
        let Some(caps) = components_regex().captures(url) else {
            return Self {
                raw: url.to_string(),
                ..Default::default()
            };
        };
        let part = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");

        let netloc = part(2).to_string();
        let (host, port) = split_authority(&netloc);

        Self {
            raw: url.to_string(),
            scheme: part(1).to_lowercase(),
            netloc,
            host,
            port,
            path: part(3).to_string(),
            query: part(4).to_string(),
        }
    }

    pub fn host_labels(&self) -> Vec<&str> {
        if self.host.is_empty() {
            Vec::new()
        } else {
            self.host.split('.').collect()
        }
    }
}

fn split_authority(netloc: &str) -> (String, Option<u16>) {
    let host_port = netloc.rsplit_once('@').map_or(netloc, |(_, rest)| rest);

    if let Some(rest) = host_port.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host.to_lowercase(), parse_port(tail.strip_prefix(':'))),
            None => (rest.to_lowercase(), None),
        };
    }

    match host_port.split_once(':') {
        Some((host, port)) => (host.to_lowercase(), parse_port(Some(port))),
        None => (host_port.to_lowercase(), None),
    }
}

fn parse_port(port: Option<&str>) -> Option<u16> {
    port.filter(|p| !p.is_empty())
        .and_then(|p| p.parse::<u16>().ok())
}
