use crate::domain::error::AuditError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype so the domain error can implement axum's response trait.
pub struct ApiError(pub AuditError);

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            AuditError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AuditError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            AuditError::MultipleObjects(msg) => {
                (StatusCode::CONFLICT, "multiple_objects", msg.clone())
            }
            err => {
                tracing::error!("request failed: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        let status = |err| ApiError(err).into_response().status();

        assert_eq!(status(AuditError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(AuditError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(AuditError::MultipleObjects("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(AuditError::Integrity("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
