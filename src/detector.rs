//! Request orchestration: one URL in, one prediction out.

use crate::config::Config;
use crate::decision_engine::Label;
use crate::domain_utils::DomainUtils;
use crate::error::PredictError;
use crate::features::assembler::{assemble, encode_network, DomainInfo};
use crate::features::lexical::{is_ip_host, LexicalExtractor};
use crate::features::{ContentAnalysis, FeatureVector};
use crate::model::EngineContext;
use crate::network::NetworkResolver;
use crate::url_model::{self, ParsedUrl};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub url: String,
    pub result: Label,
    /// Rounded to two decimals.
    pub probability: f64,
    pub features: FeatureVector,
    pub html_analysis: ContentAnalysis,
    #[serde(skip)]
    pub domain_info: DomainInfo,
    #[serde(skip)]
    pub rule: Option<&'static str>,
}

pub struct Detector {
    context: Arc<EngineContext>,
    resolver: NetworkResolver,
    request_timeout: Option<Duration>,
}

impl Detector {
    /// `request_timeout` bounds the network lookups of one request; lookups
    /// still running when it ends count as failed.
    pub fn new(
        context: Arc<EngineContext>,
        resolver: NetworkResolver,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            context,
            resolver,
            request_timeout,
        }
    }

    /// Load the model artifacts and build live lookups.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let context = EngineContext::load(&config.model, &config.decision)
            .context("Failed to load model artifacts")?;
        let resolver = NetworkResolver::from_config(config)?;
        Ok(Self::new(
            Arc::new(context),
            resolver,
            config.network.request_timeout_seconds.map(Duration::from_secs),
        ))
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub async fn predict(&self, raw: &str) -> Result<PredictionResult, PredictError> {
        let url = url_model::normalize(url_model::validate(raw)?);
        let parsed = ParsedUrl::parse(&url);
        let host = DomainUtils::to_ascii_host(&parsed.host);
        // An IP literal has no registrable domain to look up.
        let domain = (!is_ip_host(&host)).then(|| DomainUtils::registrable_domain(&host));
        log::debug!("Analyzing {url} (host: {host}, domain: {domain:?})");

        let lexical = LexicalExtractor::extract(&parsed);

        let observations = self
            .resolver
            .resolve(&url, &host, domain.as_deref(), self.request_timeout)
            .await;

        let network = encode_network(&observations, &parsed, domain.as_deref().unwrap_or(""));
        let vector = assemble(lexical, network.features, &self.context.schema).map_err(|e| {
            log::error!("Feature assembly failed for {url}: {e}");
            PredictError::from(e)
        })?;

        let probability = self.context.probability(&vector).map_err(|e| {
            log::error!("Classifier failed for {url}: {e}");
            PredictError::from(e)
        })?;
        let verdict = self.context.decision.decide(&vector, probability);
        log::info!(
            "{url}: {} (p={probability:.4}, reported {:.4})",
            verdict.label,
            verdict.probability
        );

        Ok(PredictionResult {
            url,
            result: verdict.label,
            probability: round2(verdict.probability),
            features: vector,
            html_analysis: network.content,
            domain_info: network.domain,
            rule: verdict.rule,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecisionConfig;
    use crate::decision_engine::DecisionEngine;
    use crate::error::{ClassifierError, LookupResult};
    use crate::features::FeatureSchema;
    use crate::model::Classifier;
    use crate::network::stubs::{StubDns, StubFetcher, StubProbe, StubWhois};
    use crate::network::{IndexProbe, PageFetcher, RegistrationDates, WhoisLookup};
    use async_trait::async_trait;

    struct FixedProbability(f64);

    impl Classifier for FixedProbability {
        fn n_features(&self) -> usize {
            FeatureSchema::canonical().len()
        }

        fn predict_proba(&self, _x: &[f64]) -> Result<f64, ClassifierError> {
            Ok(self.0)
        }
    }

    fn context(probability: f64) -> Arc<EngineContext> {
        Arc::new(
            EngineContext::new(
                FeatureSchema::canonical(),
                None,
                Box::new(FixedProbability(probability)),
                DecisionEngine::from_config(&DecisionConfig::default()),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_malformed_url_makes_no_lookups() {
        let dns = Arc::new(StubDns::resolving());
        let fetcher = Arc::new(StubFetcher::serving(""));
        let detector = Detector::new(
            context(0.3),
            NetworkResolver::new(dns.clone(), fetcher.clone(), None, None),
            None,
        );

        let err = detector.predict("not a url").await.unwrap_err();
        assert!(matches!(err, PredictError::MalformedUrl(_)));
        assert_eq!(err.user_message(), "malformed URL");
        assert_eq!(dns.calls.count(), 0);
        assert_eq!(fetcher.calls.count(), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_random_host_is_phishing() {
        let dns = Arc::new(StubDns::failing());
        let fetcher = Arc::new(StubFetcher::serving("<html></html>"));
        let detector = Detector::new(
            context(0.3),
            NetworkResolver::new(dns.clone(), fetcher.clone(), None, None),
            None,
        );

        let result = detector.predict("qx7vk2zj9wp4m8bf3ycth6d.ru/login").await.unwrap();
        assert_eq!(result.url, "https://qx7vk2zj9wp4m8bf3ycth6d.ru/login");
        assert_eq!(result.result, Label::Phishing);
        assert_eq!(result.probability, 0.9);
        assert_eq!(result.rule, Some("unresolvable_high_entropy"));
        assert_eq!(result.features.get("dns_record").map(|v| v.as_f64()), Some(0.0));
        assert!(result.html_analysis.external_links.is_empty());
        assert_eq!(fetcher.calls.count(), 0);
    }

    #[tokio::test]
    async fn test_response_shape() {
        let dns = Arc::new(StubDns::resolving());
        let fetcher = Arc::new(StubFetcher::serving(
            r#"<html><head><title>Example</title></head><body><a href="https://other.org/">x</a></body></html>"#,
        ));
        let detector = Detector::new(context(0.834), NetworkResolver::new(dns, fetcher, None, None), None);

        let result = detector.predict("https://example.com/").await.unwrap();
        assert_eq!(result.result, Label::Phishing);
        assert_eq!(result.probability, 0.83);

        let json = serde_json::to_value(&result).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 5);
        for key in ["url", "result", "probability", "features", "html_analysis"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["result"], "Phishing");
        assert_eq!(json["html_analysis"]["external_links"][0], "https://other.org/");
        assert_eq!(
            json["features"].as_object().unwrap().len(),
            FeatureSchema::canonical().len()
        );
    }

    struct SlowFetcher;

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str) -> LookupResult<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    struct SlowWhois;

    #[async_trait]
    impl WhoisLookup for SlowWhois {
        async fn registration(&self, _domain: &str) -> LookupResult<RegistrationDates> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(RegistrationDates {
                created: None,
                expires: None,
            })
        }
    }

    struct SlowProbe;

    #[async_trait]
    impl IndexProbe for SlowProbe {
        async fn is_indexed(&self, _domain: &str) -> LookupResult<bool> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_request_deadline_only_fails_unfinished_lookups() {
        let resolver = NetworkResolver::new(
            Arc::new(StubDns::resolving()),
            Arc::new(SlowFetcher),
            Some(Arc::new(SlowWhois)),
            Some(Arc::new(SlowProbe)),
        );
        let detector = Detector::new(context(0.7), resolver, Some(Duration::from_millis(20)));

        let result = detector.predict("example.com").await.unwrap();
        let feature = |name: &str| result.features.get(name).map(|v| v.as_f64());
        assert_eq!(feature("dns_record"), Some(1.0));
        assert_eq!(feature("domain_age"), Some(-1.0));
        assert_eq!(feature("google_index"), Some(0.0));
        assert_eq!(result.html_analysis, ContentAnalysis::default());
    }

    #[tokio::test]
    async fn test_slow_whois_keeps_resolved_dns_and_page() {
        let fetcher = Arc::new(StubFetcher::serving(
            "<html><head><title>Sign in</title></head></html>",
        ));
        let resolver = NetworkResolver::new(
            Arc::new(StubDns::resolving()),
            fetcher.clone(),
            Some(Arc::new(SlowWhois)),
            None,
        );
        let detector = Detector::new(context(0.1), resolver, Some(Duration::from_millis(50)));

        let result = detector
            .predict("https://qx7vk2zj9wp4m8bf3ycth6d.ru/")
            .await
            .unwrap();
        assert_eq!(result.features.get("dns_record").map(|v| v.as_f64()), Some(1.0));
        assert_eq!(result.features.get("domain_age").map(|v| v.as_f64()), Some(-1.0));
        assert_eq!(result.html_analysis.title, "Sign in");
        assert_eq!(result.rule, None);
        assert_eq!(result.result, Label::Legitimate);
        assert_eq!(result.probability, 0.1);
        assert_eq!(fetcher.calls.count(), 1);
    }

    #[tokio::test]
    async fn test_ip_literal_encodes_domain_lookups_as_skipped() {
        let dates = RegistrationDates {
            created: chrono::NaiveDate::from_ymd_opt(2020, 1, 1),
            expires: chrono::NaiveDate::from_ymd_opt(2030, 1, 1),
        };
        let resolver = NetworkResolver::new(
            Arc::new(StubDns::resolving()),
            Arc::new(StubFetcher::serving("<html></html>")),
            Some(Arc::new(StubWhois(Ok(dates)))),
            Some(Arc::new(StubProbe(Ok(true)))),
        );
        let detector = Detector::new(context(0.7), resolver, None);

        let result = detector.predict("http://192.168.0.1/login").await.unwrap();
        let feature = |name: &str| result.features.get(name).map(|v| v.as_f64());
        assert_eq!(feature("ip"), Some(1.0));
        assert_eq!(feature("dns_record"), Some(1.0));
        assert_eq!(feature("domain_age"), Some(0.0));
        assert_eq!(feature("domain_registration_length"), Some(0.0));
        assert_eq!(feature("google_index"), Some(0.0));
    }

    #[tokio::test]
    async fn test_uppercase_scheme_is_not_prefixed_again() {
        let dns = Arc::new(StubDns::resolving());
        let detector = Detector::new(
            context(0.7),
            NetworkResolver::new(dns, Arc::new(StubFetcher::serving("")), None, None),
            None,
        );

        let result = detector.predict("HTTPS://Example.com/").await.unwrap();
        assert_eq!(result.url, "HTTPS://Example.com/");
        assert_eq!(
            result.features.get("length_hostname"),
            Some(crate::features::FeatureValue::Int(11))
        );
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(0.834), 0.83);
        assert_eq!(round2(0.835001), 0.84);
        assert_eq!(round2(1.0), 1.0);
    }
}
