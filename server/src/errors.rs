use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Application-level failure, rendered as the uniform JSON error envelope.
///
/// Every fallible handler funnels into one of these variants; the
/// `IntoResponse` impl is the single boundary that shapes them for the wire.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal server error")]
    Internal(cja::color_eyre::Report),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<cja::color_eyre::Report> for ApiError {
    fn from(report: cja::color_eyre::Report) -> Self {
        ApiError::Internal(report)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message exposed to clients. Internal reports are masked; their
    /// details only go to the logs.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Something went wrong.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref report) = self {
            tracing::error!(error = ?report, "Request Error");
        }

        let status = self.status();
        let body = serde_json::json!({
            "statusCode": status.as_u16(),
            "message": self.public_message(),
            "success": false,
            "errors": [],
        });

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}
