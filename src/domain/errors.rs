use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid transition for {entity} {id}: {reason}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        reason: String,
    },
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Partial commit risk: {0}")]
    PartialCommitRisk(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        id: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        DomainError::InvalidTransition {
            entity,
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
