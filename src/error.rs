use std::fmt;
use thiserror::Error;

use crate::domain::{Address, ContextId, DatasetId, OfferId, RequestId};

/// The entity an error is about, so callers can present an actionable message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Offer(OfferId),
    Dataset(DatasetId),
    Request(RequestId),
    Escrow(ContextId),
    /// An entity that failed validation before an id was assigned
    Unassigned(&'static str),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Offer(id) => write!(f, "{}", id),
            EntityRef::Dataset(id) => write!(f, "{}", id),
            EntityRef::Request(id) => write!(f, "{}", id),
            EntityRef::Escrow(ctx) => write!(f, "escrow {}", ctx),
            EntityRef::Unassigned(kind) => write!(f, "new {}", kind),
        }
    }
}

impl From<OfferId> for EntityRef {
    fn from(id: OfferId) -> Self {
        EntityRef::Offer(id)
    }
}

impl From<DatasetId> for EntityRef {
    fn from(id: DatasetId) -> Self {
        EntityRef::Dataset(id)
    }
}

impl From<RequestId> for EntityRef {
    fn from(id: RequestId) -> Self {
        EntityRef::Request(id)
    }
}

impl From<ContextId> for EntityRef {
    fn from(ctx: ContextId) -> Self {
        EntityRef::Escrow(ctx)
    }
}

/// Error taxonomy exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Unauthorized,
    InvalidState,
    Conflict,
    AmountMismatch,
    UnknownProvider,
    Settlement,
    Internal,
}

/// Main error type for the coordination engine
#[derive(Error, Debug)]
pub enum TrustrainError {
    // Engine errors
    #[error("Invalid input for {entity}: {reason}")]
    InvalidInput { entity: EntityRef, reason: String },

    #[error("Not found: {entity}")]
    NotFound { entity: EntityRef },

    #[error("Unauthorized: {caller} may not act on {entity}")]
    Unauthorized { entity: EntityRef, caller: Address },

    #[error("Invalid state: cannot {operation} {entity} while {state}")]
    InvalidState {
        entity: EntityRef,
        state: String,
        operation: &'static str,
    },

    #[error("Conflict: {entity} {reason}")]
    Conflict { entity: EntityRef, reason: String },

    #[error("Amount mismatch for escrow {context}: owed {expected}, confirmed {confirmed}")]
    AmountMismatch {
        context: ContextId,
        expected: u64,
        confirmed: u64,
    },

    #[error("Unknown provider: {provider} has no registered offer")]
    UnknownProvider { provider: Address },

    // External settlement errors
    #[error("Settlement failed for escrow {context}: {reason}")]
    Settlement { context: ContextId, reason: String },

    #[error("Settlement for escrow {context} timed out after {timeout_ms}ms")]
    SettlementTimeout { context: ContextId, timeout_ms: u64 },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for TrustrainError
pub type Result<T> = std::result::Result<T, TrustrainError>;

impl TrustrainError {
    pub fn invalid_input(entity: impl Into<EntityRef>, reason: impl Into<String>) -> Self {
        TrustrainError::InvalidInput {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<EntityRef>) -> Self {
        TrustrainError::NotFound {
            entity: entity.into(),
        }
    }

    pub fn unauthorized(entity: impl Into<EntityRef>, caller: &Address) -> Self {
        TrustrainError::Unauthorized {
            entity: entity.into(),
            caller: caller.clone(),
        }
    }

    pub fn invalid_state(
        entity: impl Into<EntityRef>,
        state: impl fmt::Display,
        operation: &'static str,
    ) -> Self {
        TrustrainError::InvalidState {
            entity: entity.into(),
            state: state.to_string(),
            operation,
        }
    }

    pub fn conflict(entity: impl Into<EntityRef>, reason: impl Into<String>) -> Self {
        TrustrainError::Conflict {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Taxonomy bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrustrainError::InvalidInput { .. } => ErrorKind::InvalidInput,
            TrustrainError::NotFound { .. } => ErrorKind::NotFound,
            TrustrainError::Unauthorized { .. } => ErrorKind::Unauthorized,
            TrustrainError::InvalidState { .. } => ErrorKind::InvalidState,
            TrustrainError::Conflict { .. } => ErrorKind::Conflict,
            TrustrainError::AmountMismatch { .. } => ErrorKind::AmountMismatch,
            TrustrainError::UnknownProvider { .. } => ErrorKind::UnknownProvider,
            TrustrainError::Settlement { .. } | TrustrainError::SettlementTimeout { .. } => {
                ErrorKind::Settlement
            }
            TrustrainError::Config(_)
            | TrustrainError::Persistence(_)
            | TrustrainError::Json(_)
            | TrustrainError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Entity the error names, when it is about one
    pub fn entity(&self) -> Option<EntityRef> {
        match self {
            TrustrainError::InvalidInput { entity, .. }
            | TrustrainError::NotFound { entity }
            | TrustrainError::Unauthorized { entity, .. }
            | TrustrainError::InvalidState { entity, .. }
            | TrustrainError::Conflict { entity, .. } => Some(entity.clone()),
            TrustrainError::AmountMismatch { context, .. }
            | TrustrainError::Settlement { context, .. }
            | TrustrainError::SettlementTimeout { context, .. } => {
                Some(EntityRef::Escrow(context.clone()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_entity() {
        let err = TrustrainError::not_found(OfferId(12));
        assert_eq!(err.to_string(), "Not found: offer #12");

        let err = TrustrainError::unauthorized(RequestId(3), &Address::from("0xmallory"));
        assert!(err.to_string().contains("request #3"));
        assert!(err.to_string().contains("0xmallory"));

        let err = TrustrainError::AmountMismatch {
            context: ContextId::training(RequestId(5)),
            expected: 10,
            confirmed: 5,
        };
        assert!(err.to_string().contains("training:5"));
    }

    #[test]
    fn test_kind_and_entity() {
        let err = TrustrainError::invalid_state(RequestId(1), "REJECTED", "decide");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.entity(), Some(EntityRef::Request(RequestId(1))));

        let err = TrustrainError::UnknownProvider {
            provider: Address::from("0xnobody"),
        };
        assert_eq!(err.kind(), ErrorKind::UnknownProvider);
        assert_eq!(err.entity(), None);
    }
}
