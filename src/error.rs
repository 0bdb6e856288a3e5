//! Error types for the anofox-panel library.

use crate::core::EntityId;
use thiserror::Error;

/// Result type alias for panel operations.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Errors that can occur while fitting, applying or inverting transforms and
/// while running changepoint detection.
///
/// All variants are deterministic, data-dependent failures. Entity-scoped
/// variants name the entity that triggered them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PanelError {
    /// Malformed input: duplicate or unordered timestamps, non-finite values,
    /// misaligned invert windows, mismatched entity sets.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// A Box-Cox input value was zero or negative.
    #[error("entity {entity}: non-positive value {value} at index {index}")]
    NonPositiveValue {
        entity: EntityId,
        index: usize,
        value: f64,
    },

    /// A transformed value lies outside the domain of the inverse power map.
    #[error("entity {entity}: value {value} at index {index} is outside the inverse domain")]
    InvertDomain {
        entity: EntityId,
        index: usize,
        value: f64,
    },

    /// Zero variance where standardization is required.
    #[error("entity {entity}: zero variance, cannot standardize")]
    DegenerateVariance { entity: EntityId },

    /// Invert called without prior fit, or for an entity never fitted.
    #[error("no fitted state for entity {entity}")]
    MissingState { entity: EntityId },

    /// Pipeline invert called before fit_apply.
    #[error("pipeline must be fitted before it can be inverted")]
    PipelineNotFitted,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Invalid hyperparameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Numerical failure (e.g. singular normal equations).
    #[error("computation error: {0}")]
    ComputationError(String),
}

impl PanelError {
    /// Prefix a precondition message with the entity it concerns.
    pub(crate) fn in_entity(self, entity: &EntityId) -> Self {
        match self {
            PanelError::PreconditionViolation(msg) => {
                PanelError::PreconditionViolation(format!("entity {entity}: {msg}"))
            }
            other => other,
        }
    }
}
