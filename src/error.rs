use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy shared by every service and handler.
///
/// `Storage` is the only variant that hides its cause from the client: the
/// response carries a correlation id and the detail goes to the log.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("Erreur de stockage")]
    Storage(#[from] sqlx::Error),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Authorization(_) => "authorization",
            ApiError::RateLimited(_) => "rate_limited",
            ApiError::Storage(_) => "storage",
        }
    }

    /// Remap duplicate-key storage failures to a domain conflict. Used by the
    /// mutations whose last line of defense is a partial unique index: the
    /// losing writer of a race hits 23505 instead of the FOR UPDATE re-read.
    pub fn duplicate_as_conflict(self, msg: &str) -> Self {
        if let ApiError::Storage(sqlx::Error::Database(ref db_err)) = self {
            if db_err.code().as_deref() == Some("23505") {
                return ApiError::Conflict(msg.to_string());
            }
        }
        self
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
            ApiError::Storage(e) => {
                let correlation_id = uuid::Uuid::new_v4();
                tracing::error!("storage error [{correlation_id}]: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Erreur interne (ref: {correlation_id})"),
                )
            }
        };

        let body = ErrorBody {
            error: message,
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(ApiError::Validation("x".into()).kind(), "validation");
        assert_eq!(ApiError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(ApiError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(ApiError::Authorization("x".into()).kind(), "authorization");
    }

    #[test]
    fn test_duplicate_as_conflict_leaves_other_errors_alone() {
        let err = ApiError::NotFound("introuvable".into());
        match err.duplicate_as_conflict("déjà présent") {
            ApiError::NotFound(msg) => assert_eq!(msg, "introuvable"),
            other => panic!("unexpected variant: {other:?}"),
        }

        let err = ApiError::Storage(sqlx::Error::RowNotFound);
        assert!(matches!(
            err.duplicate_as_conflict("déjà présent"),
            ApiError::Storage(_)
        ));
    }
}
