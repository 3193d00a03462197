use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use super::credentials::CredentialError;
use super::domain::DriverStatus;
use super::repository::StoreError;
use super::validation::ValidationErrors;

/// Failures surfaced by the onboarding service. Each maps to one response code.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("submission failed validation")]
    Validation(ValidationErrors),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("cannot {action}: driver status is {actual}, expected {expected}")]
    StateConflict {
        action: &'static str,
        expected: &'static str,
        actual: DriverStatus,
    },
    #[error("Invalid or expired token.")]
    InvalidToken,
    #[error("{0}")]
    Conflict(String),
    #[error("not permitted to {0}")]
    Forbidden(&'static str),
    #[error("store error: {0}")]
    Store(StoreError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl OnboardingError {
    pub fn code(&self) -> &'static str {
        match self {
            OnboardingError::Validation(_) => "VALIDATION",
            OnboardingError::NotFound { .. } => "NOT_FOUND",
            OnboardingError::StateConflict { .. } => "STATE_CONFLICT",
            OnboardingError::InvalidToken => "INVALID_TOKEN",
            OnboardingError::Conflict(_) => "CONFLICT",
            OnboardingError::Forbidden(_) => "FORBIDDEN",
            OnboardingError::Store(_) | OnboardingError::Credential(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OnboardingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OnboardingError::NotFound { .. } => StatusCode::NOT_FOUND,
            OnboardingError::StateConflict { .. } | OnboardingError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            OnboardingError::InvalidToken => StatusCode::BAD_REQUEST,
            OnboardingError::Forbidden(_) => StatusCode::FORBIDDEN,
            OnboardingError::Store(_) | OnboardingError::Credential(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for OnboardingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => OnboardingError::NotFound { entity: "record" },
            StoreError::Conflict => {
                OnboardingError::Conflict("a record with the same unique key exists".to_string())
            }
            other => OnboardingError::Store(other),
        }
    }
}

impl IntoResponse for OnboardingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            OnboardingError::Validation(errors) => json!({
                "code": self.code(),
                "error": self.to_string(),
                "fields": errors.fields(),
            }),
            OnboardingError::Store(_) | OnboardingError::Credential(_) => {
                error!(error = %self, "onboarding request failed");
                json!({ "code": self.code(), "error": "internal error" })
            }
            _ => json!({ "code": self.code(), "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
