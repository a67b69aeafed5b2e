pub mod config;
pub mod decision_engine;
pub mod detector;
pub mod domain_utils;
pub mod error;
pub mod features;
pub mod model;
pub mod network;
pub mod url_model;

pub use config::Config;
pub use decision_engine::{DecisionEngine, Label, Verdict};
pub use detector::{Detector, PredictionResult};
pub use error::{PredictError, SchemaError};
pub use model::EngineContext;
