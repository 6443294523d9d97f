use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PreconditionFailed(String),

    /// An earlier write left records disagreeing; needs reconciliation.
    #[error("{0}")]
    PartialCommitRisk(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        let msg = e.to_string();
        match e {
            DomainError::NotFound { .. } => AppError::NotFound(msg),
            DomainError::InvalidInput(_) => AppError::BadRequest(msg),
            DomainError::InvalidTransition { .. } => AppError::Conflict(msg),
            DomainError::PreconditionFailed(_) => AppError::PreconditionFailed(msg),
            DomainError::PartialCommitRisk(_) => AppError::PartialCommitRisk(msg),
            DomainError::Internal(inner) => AppError::Internal(inner),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PreconditionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PartialCommitRisk(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": message
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn not_found_returns_404() {
        let err: AppError = DomainError::not_found("Order", "abc").into();
        assert_eq!(err.error_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Order abc not found");
    }

    #[test]
    fn internal_error_returns_500() {
        let err = AppError::Internal("something went wrong".to_string());
        assert_eq!(
            err.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_display() {
        assert_eq!(
            AppError::Internal("msg".to_string()).to_string(),
            "Internal error: msg"
        );
    }

    #[test]
    fn invalid_transition_maps_to_conflict() {
        let err: AppError =
            DomainError::invalid_transition("Order", "abc", "already Finished").into();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn precondition_failed_maps_to_422() {
        let err: AppError =
            DomainError::PreconditionFailed("coupon was already used".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn invalid_input_maps_to_bad_request() {
        let err: AppError = DomainError::InvalidInput("bad value".to_string()).into();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn partial_commit_risk_keeps_its_message() {
        let err: AppError =
            DomainError::PartialCommitRisk("order x already listed".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("order x already listed"));
    }
}
