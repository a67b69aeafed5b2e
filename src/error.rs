use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a single `predict` call.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("malformed URL: {0}")]
    MalformedUrl(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

impl PredictError {
    /// Message safe to show to the caller. Internal diagnostics stay in the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            PredictError::MalformedUrl(_) => "malformed URL",
            PredictError::Schema(_) | PredictError::Classifier(_) => "could not analyze URL",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictError::MalformedUrl(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("feature set mismatch (missing: {missing:?}, unexpected: {unexpected:?})")]
    Mismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("feature order differs from schema at position {position}: expected {expected}, found {found}")]
    OrderMismatch {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("feature {0} produced by both lexical and network extraction")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("expected {expected} features, got {found}")]
    Dimension { expected: usize, found: usize },
    #[error("tree {tree} node {node} is malformed: {reason}")]
    MalformedTree {
        tree: usize,
        node: usize,
        reason: String,
    },
    #[error("invalid classifier: {0}")]
    Invalid(String),
    #[error("classifier produced a non-finite probability")]
    NonFinite,
}

/// Why a best-effort network lookup produced no value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupFailed {
    #[error("{lookup} timed out after {after:?}")]
    Timeout {
        lookup: &'static str,
        after: Duration,
    },
    #[error("{lookup} transport error: {reason}")]
    Transport {
        lookup: &'static str,
        reason: String,
    },
    #[error("{lookup} returned no usable data: {reason}")]
    NoData {
        lookup: &'static str,
        reason: String,
    },
}

impl LookupFailed {
    pub fn transport(lookup: &'static str, reason: impl ToString) -> Self {
        LookupFailed::Transport {
            lookup,
            reason: reason.to_string(),
        }
    }

    pub fn no_data(lookup: &'static str, reason: impl ToString) -> Self {
        LookupFailed::NoData {
            lookup,
            reason: reason.to_string(),
        }
    }

    /// Transport-level failures are the only ones worth retrying.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LookupFailed::Timeout { .. } | LookupFailed::Transport { .. }
        )
    }
}

pub type LookupResult<T> = Result<T, LookupFailed>;
