#![allow(clippy::uninlined_format_args)]

use phish_detector::config::Config;
use phish_detector::domain_utils::DomainUtils;
use phish_detector::features::assembler::encode_network;
use phish_detector::features::lexical::is_ip_host;
use phish_detector::network::NetworkResolver;
use phish_detector::url_model::ParsedUrl;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("Testing REAL network lookups (DNS, page fetch, WHOIS)...");

    let mut config = Config::default();
    // The indexing probe is rate limited; only run it when asked to.
    config.search_probe.enabled = std::env::var("PROBE_SEARCH").is_ok();
    let resolver = NetworkResolver::from_config(&config)?;

    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls = vec![
            "https://www.google.com/".to_string(),
            "https://example.com/".to_string(),
            "https://github.com/login".to_string(),
            "https://qx7vk2zj9wp4m8bf3ycth6d.ru/login".to_string(),
        ];
    }

    for url in urls {
        println!("\n=== Testing URL: {} ===", url);

        let parsed = ParsedUrl::parse(&url);
        let host = DomainUtils::to_ascii_host(&parsed.host);
        let domain = (!is_ip_host(&host)).then(|| DomainUtils::registrable_domain(&host));

        let observations = resolver.resolve(&url, &host, domain.as_deref(), None).await;
        let encoded = encode_network(&observations, &parsed, domain.as_deref().unwrap_or(""));

        match &observations.dns {
            Ok(addrs) => println!("✅ DNS: {} address(es)", addrs.len()),
            Err(e) => println!("❌ DNS: {}", e),
        }
        match &observations.page {
            Some(Ok(body)) => println!("✅ Page: {} bytes", body.len()),
            Some(Err(e)) => println!("❌ Page: {}", e),
            None => println!("⏭️  Page: skipped"),
        }
        match &observations.registration {
            Some(Ok(dates)) => println!(
                "✅ WHOIS: created {:?}, expires {:?}",
                dates.created, dates.expires
            ),
            Some(Err(e)) => println!("❌ WHOIS: {}", e),
            None => println!("⏭️  WHOIS: skipped"),
        }
        match &observations.indexed {
            Some(Ok(indexed)) => println!("✅ Indexed: {}", indexed),
            Some(Err(e)) => println!("❌ Indexed: {}", e),
            None => println!("⏭️  Indexed: skipped"),
        }

        println!("  Domain info: {:?}", encoded.domain);
        println!("  Title: {:?}", encoded.content.title);
        for (name, value) in &encoded.features {
            println!("  {:<28} {}", name, value);
        }
    }

    Ok(())
}
