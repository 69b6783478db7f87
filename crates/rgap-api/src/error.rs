//! API error handling.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rgap_core::FieldError;
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Validation(Vec<FieldError>),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Invalid request",
                    "details": [FieldError::new("body", msg)]
                }),
            ),
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid request", "details": details }),
            ),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<rgap_core::Error> for ApiError {
    fn from(err: rgap_core::Error) -> Self {
        match err {
            rgap_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl From<rgap_db::DbError> for ApiError {
    fn from(err: rgap_db::DbError) -> Self {
        match err {
            rgap_db::DbError::NotFound(msg) => ApiError::NotFound(format!("{} not found", msg)),
            rgap_db::DbError::Duplicate(msg) => {
                ApiError::Conflict(format!("{} already exists", msg))
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(vec![FieldError::new("path", rejection.body_text())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_lists_details() {
        let response = ApiError::Validation(vec![FieldError::new(
            "pagination.page",
            "must be greater than or equal to 1",
        )])
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid request");
        assert_eq!(body["details"][0]["field"], "pagination.page");
    }

    #[tokio::test]
    async fn test_internal_hides_detail() {
        let response = ApiError::Internal("connection refused".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }

    #[test]
    fn test_db_errors_map_to_status() {
        let not_found: ApiError = rgap_db::DbError::NotFound("grant 7".to_string()).into();
        assert!(matches!(not_found, ApiError::NotFound(msg) if msg == "grant 7 not found"));

        let dup: ApiError =
            rgap_db::DbError::Duplicate("user with email a@b.c".to_string()).into();
        assert!(matches!(dup, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_core_invalid_input_is_json_bad_request() {
        let err: ApiError =
            rgap_core::Error::InvalidInput("unknown bookmark type: widget".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid request");
        assert_eq!(body["details"][0]["message"], "unknown bookmark type: widget");
    }
}
