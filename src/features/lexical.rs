//! Features computed from the URL string alone. No I/O, never fails.

use super::{FeatureValue, PartialFeatures};
use crate::domain_utils::DomainUtils;
use crate::url_model::ParsedUrl;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Registrable domains above this entropy are flagged `random_domain`.
pub const RANDOM_DOMAIN_ENTROPY: f64 = 4.0;

const SENSITIVE_EXTENSIONS: &[&str] = &[".exe", ".zip", ".rar", ".php", ".html"];

const COUNTED_CHARS: &[(&str, char)] = &[
    ("nb_dots", '.'),
    ("nb_hyphens", '-'),
    ("nb_at", '@'),
    ("nb_qm", '?'),
    ("nb_and", '&'),
    ("nb_eq", '='),
    ("nb_underscore", '_'),
    ("nb_tilde", '~'),
    ("nb_percent", '%'),
    ("nb_slash", '/'),
    ("nb_star", '*'),
    ("nb_colon", ':'),
    ("nb_comma", ','),
    ("nb_semicolumn", ';'),
    ("nb_dollar", '$'),
    ("nb_space", ' '),
];

const COUNTED_SUBSTRINGS: &[(&str, &str)] =
    &[("nb_www", "www"), ("nb_com", ".com"), ("nb_dslash", "//")];

fn ipv4_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").expect("static regex"))
}

fn ipv6_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F:]*:[0-9a-fA-F:]*$").expect("static regex"))
}

/// Shannon entropy over character frequencies, 0 for strings shorter than 2.
pub fn shannon_entropy(s: &str) -> f64 {
    let len = s.chars().count();
    if len < 2 {
        return 0.0;
    }

    let mut counts: BTreeMap<char, usize> = BTreeMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }

    let len = len as f64;
    let entropy: f64 = counts
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum();
    entropy.max(0.0)
}

/// Number of positions where a character equals the one before it.
pub fn char_repeat(s: &str) -> usize {
    let mut count = 0;
    let mut prev = None;
    for c in s.chars() {
        if prev == Some(c) {
            count += 1;
        }
        prev = Some(c);
    }
    count
}

/// Length of the longest maximal alphanumeric run.
pub fn longest_token(s: &str) -> usize {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|token| token.chars().count())
        .max()
        .unwrap_or(0)
}

pub fn digit_ratio(s: &str) -> f64 {
    let len = s.chars().count();
    if len == 0 {
        return 0.0;
    }
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    digits as f64 / len as f64
}

pub fn is_ip_host(host: &str) -> bool {
    ipv4_regex().is_match(host) || ipv6_regex().is_match(host)
}

pub struct LexicalExtractor;

impl LexicalExtractor {
    pub fn extract(parsed: &ParsedUrl) -> PartialFeatures {
        let url = parsed.raw.as_str();
        let url_lower = url.to_lowercase();
        let host = parsed.host.as_str();
        let labels = parsed.host_labels();
        let domain = DomainUtils::registrable_domain(host);
        let subdomain = DomainUtils::subdomain(host);
        let tld = DomainUtils::tld(host);
        let ascii_host = DomainUtils::to_ascii_host(host);

        let mut features = PartialFeatures::new();
        let mut put = |name: &str, value: FeatureValue| {
            features.insert(name.to_string(), value);
        };

        put("length_url", FeatureValue::count(url.chars().count()));
        put("length_hostname", FeatureValue::count(host.chars().count()));
        put("ip", FeatureValue::flag(is_ip_host(host)));

        for (name, ch) in COUNTED_CHARS {
            put(*name, FeatureValue::count(url.chars().filter(|c| c == ch).count()));
        }
        for (name, needle) in COUNTED_SUBSTRINGS {
            put(*name, FeatureValue::count(url.matches(*needle).count()));
        }

        put(
            "http_in_path",
            FeatureValue::flag(parsed.path.to_lowercase().contains("http")),
        );
        put(
            "https_token",
            FeatureValue::flag(url_lower.contains("https") && !url_lower.starts_with("https://")),
        );
        put("ratio_digits_url", FeatureValue::Float(digit_ratio(url)));
        put("ratio_digits_host", FeatureValue::Float(digit_ratio(host)));
        put(
            "punycode",
            FeatureValue::flag(labels.iter().any(|label| label.starts_with("xn--"))),
        );
        put("port", FeatureValue::flag(parsed.port.is_some_and(|p| p != 0)));
        put(
            "tld_in_path",
            FeatureValue::flag(!tld.is_empty() && parsed.path.contains(tld)),
        );
        put(
            "tld_in_subdomain",
            FeatureValue::flag(!tld.is_empty() && subdomain.contains(tld)),
        );
        put(
            "abnormal_subdomain",
            FeatureValue::flag(subdomain.contains("..") || subdomain.chars().count() > 30),
        );
        put("nb_subdomains", FeatureValue::count(labels.len()));
        put("prefix_suffix", FeatureValue::flag(domain.contains('-')));
        put(
            "random_domain",
            FeatureValue::flag(shannon_entropy(&domain) > RANDOM_DOMAIN_ENTROPY),
        );
        put(
            "shortening_service",
            FeatureValue::flag(DomainUtils::is_shortener(host)),
        );
        put(
            "path_extension",
            FeatureValue::flag(SENSITIVE_EXTENSIONS.iter().any(|ext| parsed.path.ends_with(ext))),
        );
        put("char_repeat", FeatureValue::count(char_repeat(url)));
        put("longest_word", FeatureValue::count(longest_token(url)));
        put("entropy_host", FeatureValue::Float(shannon_entropy(&ascii_host)));

        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::LEXICAL_FEATURES;

    fn extract(url: &str) -> PartialFeatures {
        LexicalExtractor::extract(&ParsedUrl::parse(url))
    }

    fn int(features: &PartialFeatures, name: &str) -> i64 {
        match features.get(name) {
            Some(FeatureValue::Int(v)) => *v,
            other => panic!("{name} is not an integer feature: {other:?}"),
        }
    }

    fn float(features: &PartialFeatures, name: &str) -> f64 {
        features.get(name).map(FeatureValue::as_f64).unwrap()
    }

    #[test]
    fn test_entropy_properties() {
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("a"), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
        assert!((shannon_entropy("ab") - 1.0).abs() < 1e-12);
        assert_eq!(shannon_entropy("aabb"), shannon_entropy("abab"));
        assert_eq!(shannon_entropy("abcd"), shannon_entropy("dcba"));
        assert!((shannon_entropy("abcd") - 2.0).abs() < 1e-12);
        for s in ["example.com", "x7q9-zk2.biz", "ünïcödé.de"] {
            assert!(shannon_entropy(s) >= 0.0);
        }
    }

    #[test]
    fn test_char_repeat_and_longest_token() {
        assert_eq!(char_repeat(""), 0);
        assert_eq!(char_repeat("aab"), 1);
        assert_eq!(char_repeat("aaa"), 2);
        assert_eq!(char_repeat("https://www.google.com"), 5);
        assert_eq!(longest_token("https://login-secure.example.com"), 7);
        assert_eq!(longest_token("///"), 0);
    }

    #[test]
    fn test_digit_ratio_bounds() {
        assert_eq!(digit_ratio(""), 0.0);
        assert_eq!(digit_ratio("1234"), 1.0);
        assert_eq!(digit_ratio("ab12"), 0.5);
        for url in ["https://a1.b2.com/3?4=5", "https://example.com", "0"] {
            let r = float(&extract(url), "ratio_digits_url");
            assert!((0.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn test_emits_exactly_the_lexical_names() {
        let features = extract("https://example.com");
        let names: Vec<&str> = features.keys().map(String::as_str).collect();
        let mut expected: Vec<&str> = LEXICAL_FEATURES.to_vec();
        expected.sort_unstable();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_counts_for_typical_phishing_url() {
        let url = "http://secure-login.paypal.com.verify-account.xyz:8080/~user/update.php?id=1&session=abc@x";
        let f = extract(url);

        assert_eq!(int(&f, "length_url"), url.chars().count() as i64);
        assert_eq!(int(&f, "length_hostname"), "secure-login.paypal.com.verify-account.xyz".len() as i64);
        assert_eq!(int(&f, "nb_dots"), 5);
        assert_eq!(int(&f, "nb_hyphens"), 2);
        assert_eq!(int(&f, "nb_at"), 1);
        assert_eq!(int(&f, "nb_qm"), 1);
        assert_eq!(int(&f, "nb_and"), 1);
        assert_eq!(int(&f, "nb_eq"), 2);
        assert_eq!(int(&f, "nb_tilde"), 1);
        assert_eq!(int(&f, "nb_colon"), 2);
        assert_eq!(int(&f, "nb_com"), 1);
        assert_eq!(int(&f, "nb_dslash"), 1);
        assert_eq!(int(&f, "port"), 1);
        assert_eq!(int(&f, "path_extension"), 1);
        assert_eq!(int(&f, "prefix_suffix"), 1);
        assert_eq!(int(&f, "nb_subdomains"), 5);
        assert_eq!(int(&f, "ip"), 0);
        assert_eq!(int(&f, "https_token"), 0);
    }

    #[test]
    fn test_structural_flags() {
        let ip = extract("http://192.168.0.1/login");
        assert_eq!(int(&ip, "ip"), 1);

        let v6 = extract("http://[2001:db8::1]/");
        assert_eq!(int(&v6, "ip"), 1);

        let puny = extract("https://xn--pypal-4ve.com/");
        assert_eq!(int(&puny, "punycode"), 1);

        let short = extract("https://bit.ly/3xYz");
        assert_eq!(int(&short, "shortening_service"), 1);

        let not_short = extract("https://www.microsoft.com/");
        assert_eq!(int(&not_short, "shortening_service"), 0);
        assert_eq!(int(&not_short, "nb_www"), 1);

        let token = extract("http://example.com/redirect/https-login");
        assert_eq!(int(&token, "https_token"), 1);
        assert_eq!(int(&token, "http_in_path"), 1);
    }

    #[test]
    fn test_subdomain_analysis() {
        let tld_in_sub = extract("https://paypal.com.evil.net/");
        assert_eq!(int(&tld_in_sub, "tld_in_subdomain"), 0);

        let tld_in_sub = extract("https://login.net.evil.net/");
        assert_eq!(int(&tld_in_sub, "tld_in_subdomain"), 1);

        let long_sub = extract("https://aaaaaaaaaabbbbbbbbbbccccccccccdd.example.com/");
        assert_eq!(int(&long_sub, "abnormal_subdomain"), 1);

        let plain = extract("https://example.com/com");
        assert_eq!(int(&plain, "abnormal_subdomain"), 0);
        assert_eq!(int(&plain, "tld_in_subdomain"), 0);
        assert_eq!(int(&plain, "tld_in_path"), 1);
    }

    #[test]
    fn test_entropy_uses_ascii_hostname() {
        let idn = extract("https://bücher.de/");
        let expected = shannon_entropy("xn--bcher-kva.de");
        assert!((float(&idn, "entropy_host") - expected).abs() < 1e-12);

        let plain = extract("https://example.com/");
        assert!((float(&plain, "entropy_host") - shannon_entropy("example.com")).abs() < 1e-12);
        assert_eq!(int(&plain, "random_domain"), 0);
    }

    #[test]
    fn test_unencodable_host_uses_raw_entropy() {
        let f = extract("https://ab\u{FFFF}.com/");
        let expected = shannon_entropy("ab\u{FFFF}.com");
        assert!((float(&f, "entropy_host") - expected).abs() < 1e-12);
        assert_eq!(f.len(), LEXICAL_FEATURES.len());
    }
}
