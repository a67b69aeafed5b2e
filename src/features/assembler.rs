//! Turns lookup outcomes into feature values and merges everything into a
//! schema-ordered vector. All failure defaults live here.

use super::html::{HtmlAnalyzer, PageSignals};
use super::{ContentAnalysis, FeatureSchema, FeatureValue, FeatureVector, PartialFeatures};
use crate::error::SchemaError;
use crate::network::{NetworkObservations, RegistrationDates};
use crate::url_model::ParsedUrl;
use chrono::{NaiveDate, Utc};
use serde::Serialize;

/// Sentinel for a lookup that was attempted and failed.
pub const LOOKUP_FAILED: i64 = -1;
/// Value for a lookup that was skipped.
pub const NOT_COMPUTED: i64 = 0;

/// Registration and reachability summary for the submitted domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DomainInfo {
    pub domain_age_days: i64,
    pub registration_length_days: i64,
    pub dns_resolves: bool,
    pub search_indexed: bool,
}

impl Default for DomainInfo {
    fn default() -> Self {
        Self {
            domain_age_days: NOT_COMPUTED,
            registration_length_days: NOT_COMPUTED,
            dns_resolves: false,
            search_indexed: false,
        }
    }
}

impl DomainInfo {
    /// Both values from the registration period when both dates are known,
    /// otherwise the age since creation with an unknown registration length.
    pub fn from_registration(dates: &RegistrationDates, today: NaiveDate) -> Self {
        let (age, length) = match (dates.created, dates.expires) {
            (Some(created), Some(expires)) => {
                let length = (expires - created).num_days();
                (length, length)
            }
            (Some(created), None) => ((today - created).num_days(), LOOKUP_FAILED),
            (None, _) => (LOOKUP_FAILED, LOOKUP_FAILED),
        };
        Self {
            domain_age_days: age,
            registration_length_days: length,
            ..Self::default()
        }
    }
}

/// Encoded network features plus the human-facing page summary.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedNetwork {
    pub features: PartialFeatures,
    pub content: ContentAnalysis,
    pub domain: DomainInfo,
}

/// Encode raw lookup outcomes. `parsed` is the page that was fetched and
/// `domain` the registrable domain.
pub fn encode_network(obs: &NetworkObservations, parsed: &ParsedUrl, domain: &str) -> EncodedNetwork {
    let mut info = match &obs.registration {
        Some(Ok(dates)) => DomainInfo::from_registration(dates, Utc::now().date_naive()),
        Some(Err(_)) => DomainInfo {
            domain_age_days: LOOKUP_FAILED,
            registration_length_days: LOOKUP_FAILED,
            ..DomainInfo::default()
        },
        None => DomainInfo::default(),
    };
    info.dns_resolves = obs.dns.is_ok();
    info.search_indexed = matches!(obs.indexed, Some(Ok(true)));

    let (signals, content) = match &obs.page {
        Some(Ok(html)) => HtmlAnalyzer::analyze(html, parsed, domain),
        Some(Err(_)) | None => (PageSignals::default(), ContentAnalysis::default()),
    };

    let mut features = PartialFeatures::new();
    let mut put = |name: &str, value: FeatureValue| {
        features.insert(name.to_string(), value);
    };

    put("dns_record", FeatureValue::flag(info.dns_resolves));
    put("domain_age", FeatureValue::Int(info.domain_age_days));
    put(
        "domain_registration_length",
        FeatureValue::Int(info.registration_length_days),
    );
    put("google_index", FeatureValue::flag(info.search_indexed));
    put(
        "ratio_intHyperlinks",
        FeatureValue::Float(signals.ratio_internal_links),
    );
    put(
        "ratio_extHyperlinks",
        FeatureValue::Float(signals.ratio_external_links),
    );
    put("login_form", FeatureValue::flag(signals.login_form));
    put("submit_email", FeatureValue::flag(signals.submit_email));
    put("iframe", FeatureValue::flag(signals.iframe));
    put("popup_window", FeatureValue::flag(signals.popup_window));
    put("safe_anchor", FeatureValue::Float(signals.safe_anchor));
    put("external_favicon", FeatureValue::flag(signals.external_favicon));
    put("empty_title", FeatureValue::flag(signals.empty_title));
    put("domain_in_title", FeatureValue::flag(signals.domain_in_title));

    EncodedNetwork {
        features,
        content,
        domain: info,
    }
}

/// Merge both partial maps and order them by `schema`. Fails rather than
/// filling gaps: a missing or unknown feature means the extractors and the
/// trained model disagree.
pub fn assemble(
    lexical: PartialFeatures,
    network: PartialFeatures,
    schema: &FeatureSchema,
) -> Result<FeatureVector, SchemaError> {
    let mut merged = lexical;
    for (name, value) in network {
        if merged.insert(name.clone(), value).is_some() {
            return Err(SchemaError::Duplicate(name));
        }
    }

    let missing: Vec<String> = schema
        .features
        .iter()
        .filter(|name| !merged.contains_key(*name))
        .cloned()
        .collect();
    let unexpected: Vec<String> = merged
        .keys()
        .filter(|name| schema.position(name).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(SchemaError::Mismatch {
            missing,
            unexpected,
        });
    }

    let entries = schema
        .features
        .iter()
        .filter_map(|name| merged.remove_entry(name))
        .collect();
    Ok(FeatureVector::from_ordered(entries))
}
