/// Hostname helpers shared by the lexical extractor and the WHOIS client.
pub struct DomainUtils;

/// URL shortening services recognised by `shortening_service`.
pub const SHORTENER_DOMAINS: &[&str] = &[
    "bit.ly",
    "t.co",
    "goo.gl",
    "tinyurl.com",
    "ow.ly",
    "is.gd",
    "buff.ly",
    "adf.ly",
    "bit.do",
    "mcaf.ee",
    "short.link",
    "v.gd",
    "tiny.cc",
    "rb.gy",
    "cutt.ly",
    "shorturl.at",
    "u.to",
];

const TWO_PART_SUFFIXES: &[&str] = &[
    "co.uk", "com.au", "co.jp", "co.kr", "com.br", "co.za", "com.mx", "co.in", "com.sg", "co.nz",
    "com.ar", "co.il", "org.uk", "net.au", "gov.uk", "ac.uk", "edu.au",
];

impl DomainUtils {
    /// Last two labels of the host (`example.com` from `a.b.example.com`).
    pub fn registrable_domain(host: &str) -> String {
        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() >= 2 {
            parts[parts.len() - 2..].join(".")
        } else {
            host.to_string()
        }
    }

    /// Everything before the registrable domain, empty when there is none.
    pub fn subdomain(host: &str) -> String {
        let parts: Vec<&str> = host.split('.').collect();
        if parts.len() > 2 {
            parts[..parts.len() - 2].join(".")
        } else {
            String::new()
        }
    }

    pub fn tld(host: &str) -> &str {
        host.rsplit('.').next().unwrap_or("")
    }

    /// Check if domain matches any in list (with hierarchy support)
    pub fn matches_domain_list(domain: &str, domain_list: &[&str]) -> bool {
        let domain_lower = domain.to_lowercase();

        domain_list.iter().any(|pattern| {
            let pattern_lower = pattern.to_lowercase();
            domain_lower == pattern_lower || domain_lower.ends_with(&format!(".{pattern_lower}"))
        })
    }

    pub fn is_shortener(host: &str) -> bool {
        Self::matches_domain_list(host, SHORTENER_DOMAINS)
    }

    /// ASCII-compatible form of an internationalized hostname. Falls back to
    /// the raw host when IDNA processing rejects it.
    pub fn to_ascii_host(host: &str) -> String {
        if host.is_ascii() {
            return host.to_lowercase();
        }
        match idna::domain_to_ascii(host) {
            Ok(ascii) if !ascii.is_empty() => ascii,
            Ok(_) => host.to_string(),
            Err(e) => {
                log::debug!("IDNA encoding failed for {host}: {e:?}, using raw hostname");
                host.to_string()
            }
        }
    }

    /// Domain to send to a WHOIS server: the registrable domain, widened to
    /// three labels under common two-part public suffixes (`example.co.uk`).
    pub fn whois_root_domain(domain: &str) -> String {
        let parts: Vec<&str> = domain.split('.').collect();
        if parts.len() < 2 {
            return domain.to_string();
        }

        if parts.len() >= 3 {
            let suffix = parts[parts.len() - 2..].join(".");
            if TWO_PART_SUFFIXES.contains(&suffix.as_str()) {
                return parts[parts.len() - 3..].join(".");
            }
        }

        parts[parts.len() - 2..].join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registrable_domain_and_subdomain() {
        assert_eq!(DomainUtils::registrable_domain("a.b.example.com"), "example.com");
        assert_eq!(DomainUtils::registrable_domain("example.com"), "example.com");
        assert_eq!(DomainUtils::registrable_domain("localhost"), "localhost");
        assert_eq!(DomainUtils::subdomain("a.b.example.com"), "a.b");
        assert_eq!(DomainUtils::subdomain("example.com"), "");
        assert_eq!(DomainUtils::tld("a.b.example.com"), "com");
        assert_eq!(DomainUtils::tld(""), "");
    }

    #[test]
    fn test_shortener_matching_is_label_aware() {
        assert!(DomainUtils::is_shortener("bit.ly"));
        assert!(DomainUtils::is_shortener("www.tinyurl.com"));
        assert!(DomainUtils::is_shortener("t.co"));
        assert!(!DomainUtils::is_shortener("microsoft.com"));
        assert!(!DomainUtils::is_shortener("example.com"));
    }

    #[test]
    fn test_to_ascii_host() {
        assert_eq!(DomainUtils::to_ascii_host("Example.COM"), "example.com");
        assert_eq!(DomainUtils::to_ascii_host("bücher.de"), "xn--bcher-kva.de");
    }

    #[test]
    fn test_to_ascii_host_falls_back_to_raw_host() {
        // U+FFFF is disallowed by IDNA mapping.
        let host = "ab\u{FFFF}.com";
        assert_eq!(DomainUtils::to_ascii_host(host), host);
    }

    #[test]
    fn test_whois_root_domain() {
        assert_eq!(DomainUtils::whois_root_domain("example.com"), "example.com");
        assert_eq!(
            DomainUtils::whois_root_domain("email.nationalgeographic.com"),
            "nationalgeographic.com"
        );
        assert_eq!(DomainUtils::whois_root_domain("mail.example.co.uk"), "example.co.uk");
        assert_eq!(DomainUtils::whois_root_domain("test.company.com.au"), "company.com.au");
        assert_eq!(DomainUtils::whois_root_domain("single"), "single");
    }
}
