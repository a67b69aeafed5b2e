//! Decision Engine
//!
//! Turns the classifier probability into a verdict, then walks an ordered
//! list of override rules. The first rule that matches decides; when none
//! matches the base verdict stands.

use crate::config::DecisionConfig;
use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Legitimate,
    Phishing,
    Suspicious,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Label::Legitimate => "Legitimate",
            Label::Phishing => "Phishing",
            Label::Suspicious => "Suspicious",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub label: Label,
    pub probability: f64,
    /// Override rule that produced this verdict, if any.
    pub rule: Option<&'static str>,
}

impl Verdict {
    /// How strongly the classifier backs this label. `probability` is always
    /// the phishing probability, so a legitimate call is as confident as
    /// `1 - probability`.
    pub fn confidence(&self) -> f64 {
        match self.label {
            Label::Legitimate => 1.0 - self.probability,
            Label::Phishing | Label::Suspicious => self.probability,
        }
    }
}

/// A predicate over the features and the base verdict, plus the verdict it
/// forces when it holds.
pub trait OverrideRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, vector: &FeatureVector, base: &Verdict) -> Option<Verdict>;
}

/// An unresolvable host with a random-looking name is phishing regardless of
/// the classifier.
pub struct UnresolvableHighEntropy {
    pub entropy_threshold: f64,
    pub probability_floor: f64,
}

impl OverrideRule for UnresolvableHighEntropy {
    fn name(&self) -> &'static str {
        "unresolvable_high_entropy"
    }

    fn apply(&self, vector: &FeatureVector, base: &Verdict) -> Option<Verdict> {
        let dns_record = vector.get("dns_record")?.as_f64();
        let entropy = vector.get("entropy_host")?.as_f64();
        if dns_record == 0.0 && entropy > self.entropy_threshold {
            Some(Verdict {
                label: Label::Phishing,
                probability: base.probability.max(self.probability_floor),
                rule: Some(self.name()),
            })
        } else {
            None
        }
    }
}

/// A legitimate call the classifier is unsure about is relabelled; the
/// probability is kept.
pub struct LowConfidenceLegitimate {
    pub below: f64,
}

impl OverrideRule for LowConfidenceLegitimate {
    fn name(&self) -> &'static str {
        "low_confidence_legitimate"
    }

    fn apply(&self, _vector: &FeatureVector, base: &Verdict) -> Option<Verdict> {
        if base.label == Label::Legitimate && base.confidence() < self.below {
            Some(Verdict {
                label: Label::Suspicious,
                rule: Some(self.name()),
                ..*base
            })
        } else {
            None
        }
    }
}

pub struct DecisionEngine {
    phishing_threshold: f64,
    rules: Vec<Box<dyn OverrideRule>>,
}

impl DecisionEngine {
    pub fn new(phishing_threshold: f64, rules: Vec<Box<dyn OverrideRule>>) -> Self {
        Self {
            phishing_threshold,
            rules,
        }
    }

    /// Standard rule chain, in precedence order.
    pub fn from_config(config: &DecisionConfig) -> Self {
        Self::new(
            config.phishing_threshold,
            vec![
                Box::new(UnresolvableHighEntropy {
                    entropy_threshold: config.entropy_threshold,
                    probability_floor: config.unresolvable_probability_floor,
                }),
                Box::new(LowConfidenceLegitimate {
                    below: config.suspicious_below,
                }),
            ],
        )
    }

    pub fn base_verdict(&self, probability: f64) -> Verdict {
        let label = if probability >= self.phishing_threshold {
            Label::Phishing
        } else {
            Label::Legitimate
        };
        Verdict {
            label,
            probability,
            rule: None,
        }
    }

    pub fn decide(&self, vector: &FeatureVector, probability: f64) -> Verdict {
        self.apply_overrides(vector, self.base_verdict(probability))
    }

    /// Run the rule chain over an already computed base verdict.
    pub fn apply_overrides(&self, vector: &FeatureVector, base: Verdict) -> Verdict {
        for rule in &self.rules {
            if let Some(verdict) = rule.apply(vector, &base) {
                log::debug!(
                    "Override {} changed {} ({:.2}) to {} ({:.2})",
                    rule.name(),
                    base.label,
                    base.probability,
                    verdict.label,
                    verdict.probability
                );
                return verdict;
            }
        }
        base
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureValue;

    fn vector(dns_record: i64, entropy_host: f64) -> FeatureVector {
        FeatureVector::from_ordered(vec![
            ("dns_record".to_string(), FeatureValue::Int(dns_record)),
            ("entropy_host".to_string(), FeatureValue::Float(entropy_host)),
        ])
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::from_config(&DecisionConfig::default())
    }

    #[test]
    fn test_unresolvable_high_entropy_wins() {
        let verdict = engine().decide(&vector(0, 5.0), 0.3);
        assert_eq!(verdict.label, Label::Phishing);
        assert!(verdict.probability >= 0.9);
        assert_eq!(verdict.rule, Some("unresolvable_high_entropy"));

        // A probability already above the floor is kept.
        let verdict = engine().decide(&vector(0, 5.0), 0.97);
        assert_eq!(verdict.probability, 0.97);
    }

    fn legitimate(probability: f64) -> Verdict {
        Verdict {
            label: Label::Legitimate,
            probability,
            rule: None,
        }
    }

    #[test]
    fn test_confidence_follows_the_label() {
        assert!((legitimate(0.45).confidence() - 0.55).abs() < 1e-12);
        let phishing = Verdict {
            label: Label::Phishing,
            probability: 0.8,
            rule: None,
        };
        assert_eq!(phishing.confidence(), 0.8);
    }

    #[test]
    fn test_low_confidence_legitimate_is_suspicious() {
        // Legitimate at 0.55 confidence.
        let verdict = engine().decide(&vector(1, 2.0), 0.45);
        assert_eq!(verdict.label, Label::Suspicious);
        assert_eq!(verdict.probability, 0.45);
        assert_eq!(verdict.rule, Some("low_confidence_legitimate"));

        let verdict = engine().apply_overrides(&vector(1, 2.0), legitimate(0.45));
        assert_eq!(verdict.label, Label::Suspicious);
        assert_eq!(verdict.probability, 0.45);
    }

    #[test]
    fn test_confident_legitimate_is_unchanged() {
        // Legitimate at 0.81 confidence.
        let verdict = engine().decide(&vector(1, 2.0), 0.19);
        assert_eq!(verdict, legitimate(0.19));

        let verdict = engine().apply_overrides(&vector(1, 2.0), legitimate(0.19));
        assert_eq!(verdict, legitimate(0.19));
    }

    #[test]
    fn test_every_label_is_reachable() {
        let engine = engine();
        let labels: Vec<Label> = (0..=100)
            .map(|i| engine.decide(&vector(1, 2.0), f64::from(i) / 100.0).label)
            .collect();
        for label in [Label::Legitimate, Label::Suspicious, Label::Phishing] {
            assert!(labels.contains(&label), "{label} never decided");
        }
        assert_eq!(engine.decide(&vector(1, 2.0), 0.0).label, Label::Legitimate);
        assert_eq!(engine.decide(&vector(1, 2.0), 0.41).label, Label::Suspicious);
        assert_eq!(engine.decide(&vector(1, 2.0), 0.39).label, Label::Legitimate);
    }

    #[test]
    fn test_base_verdict_threshold() {
        assert_eq!(engine().base_verdict(0.5).label, Label::Phishing);
        assert_eq!(engine().base_verdict(0.49).label, Label::Legitimate);

        let verdict = engine().decide(&vector(1, 5.0), 0.55);
        assert_eq!(verdict.label, Label::Phishing);
        assert_eq!(verdict.rule, None);

        let engine = DecisionEngine::from_config(&DecisionConfig {
            phishing_threshold: 0.7,
            ..DecisionConfig::default()
        });
        assert_eq!(engine.decide(&vector(1, 2.0), 0.65).label, Label::Suspicious);
        assert_eq!(engine.decide(&vector(1, 2.0), 0.3).label, Label::Legitimate);
    }

    #[test]
    fn test_low_entropy_unresolvable_falls_through() {
        let verdict = engine().decide(&vector(0, 3.0), 0.2);
        assert_eq!(verdict, legitimate(0.2));

        let verdict = engine().decide(&vector(0, 3.0), 0.45);
        assert_eq!(verdict.label, Label::Suspicious);
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(
            engine().rule_names(),
            vec!["unresolvable_high_entropy", "low_confidence_legitimate"]
        );
    }
}
