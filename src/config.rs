use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub network: NetworkConfig,
    pub whois: WhoisConfig,
    pub search_probe: SearchProbeConfig,
    pub decision: DecisionConfig,
}

/// Locations of the trained artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub classifier_path: String,
    pub schema_path: String,
    /// Standardization parameters. Features are fed unscaled when absent.
    pub scaler_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub dns_timeout_seconds: u64,
    pub http_timeout_seconds: u64,
    pub user_agent: String,
    /// Page bodies are cut off after this many bytes.
    pub max_page_bytes: usize,
    /// Overall budget for all lookups of one request. Unbounded beyond the
    /// per-lookup timeouts when unset.
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhoisConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchProbeConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub retry_delay_seconds: u64,
}

/// Thresholds used when turning a probability into a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Probabilities at or above this are phishing.
    pub phishing_threshold: f64,
    /// Legitimate verdicts whose confidence (`1 - probability`) is below this
    /// are reported as suspicious.
    pub suspicious_below: f64,
    /// Host entropy above which an unresolvable host is treated as phishing.
    pub entropy_threshold: f64,
    pub unresolvable_probability_floor: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            classifier_path: "models/ensemble.json".to_string(),
            schema_path: "models/schema.json".to_string(),
            scaler_path: Some("models/scaler.json".to_string()),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            dns_timeout_seconds: 5,
            http_timeout_seconds: 5,
            user_agent: format!("phish-detector/{}", env!("CARGO_PKG_VERSION")),
            max_page_bytes: 2 * 1024 * 1024,
            request_timeout_seconds: None,
        }
    }
}

impl Default for WhoisConfig {
    fn default() -> Self {
        WhoisConfig {
            enabled: true,
            timeout_seconds: 10,
        }
    }
}

impl Default for SearchProbeConfig {
    fn default() -> Self {
        SearchProbeConfig {
            enabled: false,
            endpoint: "https://www.google.com/search".to_string(),
            timeout_seconds: 5,
            max_attempts: 3,
            retry_delay_seconds: 2,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        DecisionConfig {
            phishing_threshold: 0.5,
            suspicious_below: 0.6,
            entropy_threshold: 4.5,
            unresolvable_probability_floor: 0.9,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {path}"))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {path}"))?;
        Ok(config)
    }

    /// Load `path`, or the built-in defaults when the file does not exist.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            log::warn!("Configuration file {path} not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let d = &self.decision;
        for (name, value) in [
            ("phishing_threshold", d.phishing_threshold),
            ("suspicious_below", d.suspicious_below),
            ("unresolvable_probability_floor", d.unresolvable_probability_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("decision.{name} must be within [0, 1], got {value}");
            }
        }
        if !d.entropy_threshold.is_finite() || d.entropy_threshold < 0.0 {
            bail!(
                "decision.entropy_threshold must be a non-negative number, got {}",
                d.entropy_threshold
            );
        }

        for (name, value) in [
            ("network.dns_timeout_seconds", self.network.dns_timeout_seconds),
            ("network.http_timeout_seconds", self.network.http_timeout_seconds),
            ("whois.timeout_seconds", self.whois.timeout_seconds),
            ("search_probe.timeout_seconds", self.search_probe.timeout_seconds),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.network.max_page_bytes == 0 {
            bail!("network.max_page_bytes must be greater than zero");
        }
        if self.network.request_timeout_seconds == Some(0) {
            bail!("network.request_timeout_seconds must be greater than zero when set");
        }
        if self.search_probe.max_attempts == 0 {
            bail!("search_probe.max_attempts must be at least 1");
        }
        if self.search_probe.enabled {
            url::Url::parse(&self.search_probe.endpoint)
                .with_context(|| format!("Invalid search_probe.endpoint {}", self.search_probe.endpoint))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.decision.phishing_threshold, 0.5);
        assert_eq!(config.decision.suspicious_below, 0.6);
        assert_eq!(config.decision.entropy_threshold, 4.5);
        assert_eq!(config.search_probe.max_attempts, 3);
        assert!(!config.search_probe.enabled);
        assert!(config.whois.enabled);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
decision:
  suspicious_below: 0.7
search_probe:
  enabled: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.decision.suspicious_below, 0.7);
        assert_eq!(config.decision.phishing_threshold, 0.5);
        assert!(config.search_probe.enabled);
        assert_eq!(config.search_probe.retry_delay_seconds, 2);
        assert_eq!(config.network.dns_timeout_seconds, 5);
        assert_eq!(config.network.max_page_bytes, 2 * 1024 * 1024);
        assert_eq!(config.model.schema_path, "models/schema.json");
    }

    #[test]
    fn test_invalid_thresholds_are_rejected() {
        let mut config = Config::default();
        config.decision.phishing_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search_probe.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.network.request_timeout_seconds = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.network.max_page_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("phish-detector-config-{}.yaml", std::process::id()));
        let path = path.to_string_lossy().to_string();

        let mut config = Config::default();
        config.network.request_timeout_seconds = Some(20);
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.network.request_timeout_seconds, Some(20));
        assert_eq!(loaded.model.scaler_path, config.model.scaler_path);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default("/nonexistent/phish-detector.yaml").unwrap();
        assert_eq!(config.whois.timeout_seconds, 10);
    }
}
