//! Domain errors

use thiserror::Error;

/// Errors raised while decoding, dispatching or handling OCPP messages.
///
/// `Format`, `UnsupportedFeature` and `Validation` only ever abort the one
/// message that caused them; the connection stays open.
#[derive(Debug, Clone, Error)]
pub enum OcppError {
    /// The frame itself is malformed; its unique id may be unrecoverable.
    #[error("Malformed frame: {0}")]
    Format(String),

    /// The action has no entry in the dispatch table.
    #[error("Unsupported action: {action}")]
    UnsupportedFeature { action: String },

    /// A payload field is missing, mistyped or violates its constraint.
    #[error("Invalid field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// No live socket is registered for the charge point.
    #[error("Charge point {0} is not connected")]
    NotConnected(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(String),
}

impl OcppError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// OCPP-J error code used when this error is reported in a CallError frame.
    pub fn call_error_code(&self) -> &'static str {
        match self {
            Self::Format(_) => "FormationViolation",
            Self::UnsupportedFeature { .. } => "NotImplemented",
            Self::Validation { .. } => "PropertyConstraintViolation",
            Self::NotConnected(_) | Self::NotFound { .. } | Self::Database(_) => "InternalError",
        }
    }
}

/// Result type for domain operations
pub type OcppResult<T> = Result<T, OcppError>;
