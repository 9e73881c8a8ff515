use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use finsight_core::{PipelineError, ValidationError};
use serde_json::json;
use tracing::error;

/// Pipeline failure rendered as a JSON error response.
///
/// Data-shape failures are 400 with their message; everything else is 500
/// with a generic message, the detail only going to the log.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self(error)
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self(PipelineError::Validation(error))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::BAD_REQUEST {
            self.0.to_string()
        } else {
            error!(code = self.0.code(), error = %self.0, "request failed");
            String::from("internal server error")
        };

        let body = json!({ "error": message, "code": self.0.code() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_shape_errors_are_bad_requests() {
        assert_eq!(
            ApiError(PipelineError::insufficient("one bar")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(PipelineError::NotFound("ZZZZ".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ValidationError::EmptySymbol).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn infrastructure_errors_are_server_errors() {
        assert_eq!(
            ApiError(PipelineError::upstream("duckdb locked")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError(PipelineError::ModelUnavailable("corrupt".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
