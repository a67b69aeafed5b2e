pub mod assembler;
pub mod html;
pub mod lexical;

use crate::error::SchemaError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Version of the feature set this build extracts.
pub const SCHEMA_VERSION: u32 = 3;

pub const LEXICAL_FEATURES: &[&str] = &[
    "length_url",
    "length_hostname",
    "ip",
    "nb_dots",
    "nb_hyphens",
    "nb_at",
    "nb_qm",
    "nb_and",
    "nb_eq",
    "nb_underscore",
    "nb_tilde",
    "nb_percent",
    "nb_slash",
    "nb_star",
    "nb_colon",
    "nb_comma",
    "nb_semicolumn",
    "nb_dollar",
    "nb_space",
    "nb_www",
    "nb_com",
    "nb_dslash",
    "http_in_path",
    "https_token",
    "ratio_digits_url",
    "ratio_digits_host",
    "punycode",
    "port",
    "tld_in_path",
    "tld_in_subdomain",
    "abnormal_subdomain",
    "nb_subdomains",
    "prefix_suffix",
    "random_domain",
    "shortening_service",
    "path_extension",
    "char_repeat",
    "longest_word",
    "entropy_host",
];

pub const NETWORK_FEATURES: &[&str] = &[
    "dns_record",
    "domain_age",
    "domain_registration_length",
    "google_index",
    "ratio_intHyperlinks",
    "ratio_extHyperlinks",
    "login_form",
    "submit_email",
    "iframe",
    "popup_window",
    "safe_anchor",
    "external_favicon",
    "empty_title",
    "domain_in_title",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
}

impl FeatureValue {
    pub fn flag(on: bool) -> Self {
        FeatureValue::Int(i64::from(on))
    }

    pub fn count(n: usize) -> Self {
        FeatureValue::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            FeatureValue::Int(v) => v as f64,
            FeatureValue::Float(v) => v,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(v) => write!(f, "{v}"),
            FeatureValue::Float(v) => write!(f, "{v:.4}"),
        }
    }
}

/// One extractor's share of the features, keyed by name.
pub type PartialFeatures = BTreeMap<String, FeatureValue>;

/// Ordered list of feature names a classifier was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub features: Vec<String>,
}

impl FeatureSchema {
    pub fn canonical() -> Self {
        Self {
            version: SCHEMA_VERSION,
            features: LEXICAL_FEATURES
                .iter()
                .chain(NETWORK_FEATURES)
                .map(|name| name.to_string())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f == name)
    }

    /// Refuse any schema other than the one this build extracts.
    pub fn ensure_canonical(&self) -> Result<(), SchemaError> {
        let canonical = Self::canonical();
        if self.version != canonical.version {
            return Err(SchemaError::VersionMismatch {
                expected: canonical.version,
                found: self.version,
            });
        }

        let missing: Vec<String> = canonical
            .features
            .iter()
            .filter(|name| !self.features.contains(name))
            .cloned()
            .collect();
        let unexpected: Vec<String> = self
            .features
            .iter()
            .filter(|name| !canonical.features.contains(name))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() || self.len() != canonical.len() {
            return Err(SchemaError::Mismatch {
                missing,
                unexpected,
            });
        }

        for (position, (expected, found)) in canonical.features.iter().zip(&self.features).enumerate() {
            if expected != found {
                return Err(SchemaError::OrderMismatch {
                    position,
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Feature values in schema order. Only the assembler builds these.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, FeatureValue)>,
}

impl FeatureVector {
    pub(crate) fn from_ordered(entries: Vec<(String, FeatureValue)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<FeatureValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| v.as_f64()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Human-facing page summary. Never fed to the classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub link_count: usize,
    pub form_count: usize,
    pub iframe_count: usize,
    pub title: String,
    pub external_links: Vec<String>,
}
