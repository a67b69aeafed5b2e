use super::{Classifier, TrainedOn};
use crate::error::ClassifierError;
use serde::{Deserialize, Serialize};

/// One node of a flattened decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Children must come after their parent, which also rules out cycles.
    fn validate(&self, tree: usize, n_features: usize) -> Result<(), ClassifierError> {
        let malformed = |node: usize, reason: String| ClassifierError::MalformedTree { tree, node, reason };

        if self.nodes.is_empty() {
            return Err(malformed(0, "tree has no nodes".to_string()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= n_features {
                        return Err(malformed(
                            index,
                            format!("feature index {feature} out of range ({n_features} features)"),
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(malformed(index, "non-finite threshold".to_string()));
                    }
                    for child in [left, right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(malformed(index, format!("invalid child index {child}")));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(malformed(index, "non-finite leaf value".to_string()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Value of the leaf reached by `x`. The tree must have been validated.
    fn evaluate(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[feature] <= threshold { left } else { right };
                }
                Node::Leaf { value } => return value,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticModel {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        let z: f64 = self
            .coefficients
            .iter()
            .zip(x)
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.intercept;
        sigmoid(z)
    }
}

/// Leaves hold the positive-class probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<Tree>,
}

impl RandomForest {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.evaluate(x)).sum();
        sum / self.trees.len() as f64
    }
}

/// Leaves hold additive log-odds contributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub learning_rate: f64,
    pub init_log_odds: f64,
    pub trees: Vec<Tree>,
}

impl GradientBoosting {
    fn predict_proba(&self, x: &[f64]) -> f64 {
        let raw: f64 = self.trees.iter().map(|t| t.evaluate(x)).sum();
        sigmoid(self.init_log_odds + self.learning_rate * raw)
    }
}

/// Evaluation figures recorded at training time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub val_accuracy: Option<f64>,
    pub test_accuracy: Option<f64>,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: Option<Vec<Vec<u64>>>,
}

/// Weighted average of a logistic model, a random forest and a gradient
/// boosted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftVotingEnsemble {
    #[serde(flatten)]
    pub trained_on: TrainedOn,
    /// Weights for `[logistic, random_forest, gradient_boosting]`.
    pub voting_weights: [f64; 3],
    pub logistic: LogisticModel,
    pub random_forest: RandomForest,
    pub gradient_boosting: GradientBoosting,
    #[serde(default)]
    pub info: Option<ModelInfo>,
}

impl SoftVotingEnsemble {
    pub fn validate(&self, n_features: usize) -> Result<(), ClassifierError> {
        if self.logistic.coefficients.len() != n_features {
            return Err(ClassifierError::Dimension {
                expected: n_features,
                found: self.logistic.coefficients.len(),
            });
        }
        if !self.logistic.intercept.is_finite()
            || self.logistic.coefficients.iter().any(|c| !c.is_finite())
        {
            return Err(ClassifierError::NonFinite);
        }

        let weight_sum: f64 = self.voting_weights.iter().sum();
        if self.voting_weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weight_sum <= 0.0 {
            return Err(ClassifierError::Invalid(format!(
                "voting weights {:?}",
                self.voting_weights
            )));
        }

        if self.random_forest.trees.is_empty() {
            return Err(ClassifierError::Invalid(
                "random forest has no trees".to_string(),
            ));
        }
        if !self.gradient_boosting.learning_rate.is_finite() || !self.gradient_boosting.init_log_odds.is_finite() {
            return Err(ClassifierError::NonFinite);
        }

        // Forest trees are numbered first, boosting trees continue the count.
        let forest = self.random_forest.trees.iter();
        let boosting = self.gradient_boosting.trees.iter();
        for (index, tree) in forest.chain(boosting).enumerate() {
            tree.validate(index, n_features)?;
        }
        Ok(())
    }

    /// Probabilities of each member, in voting-weight order.
    fn member_probabilities(&self, x: &[f64]) -> [f64; 3] {
        [
            self.logistic.predict_proba(x),
            self.random_forest.predict_proba(x),
            self.gradient_boosting.predict_proba(x),
        ]
    }
}

impl Classifier for SoftVotingEnsemble {
    fn n_features(&self) -> usize {
        self.logistic.coefficients.len()
    }

    fn predict_proba(&self, x: &[f64]) -> Result<f64, ClassifierError> {
        if x.len() != self.n_features() {
            return Err(ClassifierError::Dimension {
                expected: self.n_features(),
                found: x.len(),
            });
        }

        let members = self.member_probabilities(x);
        let weight_sum: f64 = self.voting_weights.iter().sum();
        let p = members
            .iter()
            .zip(&self.voting_weights)
            .map(|(p, w)| p * w)
            .sum::<f64>()
            / weight_sum;

        if p.is_finite() {
            Ok(p.clamp(0.0, 1.0))
        } else {
            Err(ClassifierError::NonFinite)
        }
    }

    fn info(&self) -> Option<&ModelInfo> {
        self.info.as_ref()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
