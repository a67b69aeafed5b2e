//! Trained artifacts and the immutable context built from them.

pub mod ensemble;

use crate::config::{DecisionConfig, ModelConfig};
use crate::decision_engine::DecisionEngine;
use crate::error::{ClassifierError, SchemaError};
use crate::features::{FeatureSchema, FeatureVector};
use anyhow::{bail, Context};
use ensemble::{ModelInfo, SoftVotingEnsemble};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Positive-class probability model over a scaled feature vector.
pub trait Classifier: Send + Sync {
    fn n_features(&self) -> usize;

    fn predict_proba(&self, x: &[f64]) -> Result<f64, ClassifierError>;

    fn info(&self) -> Option<&ModelInfo> {
        None
    }
}

/// Feature set an artifact was fitted on, stored alongside its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedOn {
    pub schema_version: u32,
    pub features: Vec<String>,
}

impl TrainedOn {
    pub fn canonical() -> Self {
        let schema = FeatureSchema::canonical();
        Self {
            schema_version: schema.version,
            features: schema.features,
        }
    }

    /// Artifacts fitted on any other feature set are refused.
    pub fn ensure_canonical(&self) -> Result<(), SchemaError> {
        FeatureSchema {
            version: self.schema_version,
            features: self.features.clone(),
        }
        .ensure_canonical()
    }
}

/// Standard-score transform fitted on the training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    #[serde(flatten)]
    pub trained_on: TrainedOn,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn transform(&self, x: &[f64]) -> Result<Vec<f64>, ClassifierError> {
        if x.len() != self.mean.len() {
            return Err(ClassifierError::Dimension {
                expected: self.mean.len(),
                found: x.len(),
            });
        }
        Ok(x
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (mean, scale))| {
                // Constant training columns have zero scale.
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (v - mean) / scale
            })
            .collect())
    }
}

/// Everything a prediction needs that is fixed at startup.
pub struct EngineContext {
    pub schema: FeatureSchema,
    pub scaler: Option<Scaler>,
    pub classifier: Box<dyn Classifier>,
    pub decision: DecisionEngine,
}

impl EngineContext {
    /// Check that the parts agree on the feature count.
    pub fn new(
        schema: FeatureSchema,
        scaler: Option<Scaler>,
        classifier: Box<dyn Classifier>,
        decision: DecisionEngine,
    ) -> anyhow::Result<Self> {
        if classifier.n_features() != schema.len() {
            bail!(
                "Classifier expects {} features but schema lists {}",
                classifier.n_features(),
                schema.len()
            );
        }
        if let Some(scaler) = &scaler {
            if scaler.mean.len() != schema.len() || scaler.scale.len() != schema.len() {
                bail!(
                    "Scaler has {} means and {} scales but schema lists {} features",
                    scaler.mean.len(),
                    scaler.scale.len(),
                    schema.len()
                );
            }
        }
        Ok(Self {
            schema,
            scaler,
            classifier,
            decision,
        })
    }

    /// Load and validate all artifacts. Any problem aborts startup.
    pub fn load(model: &ModelConfig, decision: &DecisionConfig) -> anyhow::Result<Self> {
        let schema: FeatureSchema = read_json(&model.schema_path, "feature schema")?;
        schema
            .ensure_canonical()
            .with_context(|| format!("Feature schema {} is not usable", model.schema_path))?;

        let scaler = match &model.scaler_path {
            Some(path) => {
                let scaler: Scaler = read_json(path, "scaler")?;
                scaler
                    .trained_on
                    .ensure_canonical()
                    .with_context(|| format!("Scaler {path} was fitted on another feature set"))?;
                Some(scaler)
            }
            None => {
                log::warn!("No scaler configured, features are passed to the classifier unscaled");
                None
            }
        };

        let ensemble: SoftVotingEnsemble = read_json(&model.classifier_path, "classifier")?;
        ensemble.trained_on.ensure_canonical().with_context(|| {
            format!(
                "Classifier {} was trained on another feature set",
                model.classifier_path
            )
        })?;
        ensemble
            .validate(schema.len())
            .with_context(|| format!("Classifier {} is not usable", model.classifier_path))?;

        log::info!(
            "Loaded classifier {} ({} trees) for schema v{} with {} features",
            model.classifier_path,
            ensemble.random_forest.trees.len() + ensemble.gradient_boosting.trees.len(),
            schema.version,
            schema.len()
        );

        Self::new(
            schema,
            scaler,
            Box::new(ensemble),
            DecisionEngine::from_config(decision),
        )
    }

    pub fn info(&self) -> Option<&ModelInfo> {
        self.classifier.info()
    }

    /// Positive-class probability for an assembled vector.
    pub fn probability(&self, vector: &FeatureVector) -> Result<f64, ClassifierError> {
        let raw = vector.to_f64_vec();
        let x = match &self.scaler {
            Some(scaler) => scaler.transform(&raw)?,
            None => raw,
        };
        self.classifier.predict_proba(&x)
    }
}

fn read_json<T: DeserializeOwned>(path: &str, what: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {what} from {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {what} in {path}"))
}
