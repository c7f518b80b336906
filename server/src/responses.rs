use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Uniform success envelope wrapping every API response body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
            message: message.into(),
            success: status.as_u16() < 400,
        }
    }

    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, data, message)
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CREATED, data, message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_flag_follows_status_code() {
        let ok = ApiResponse::ok(serde_json::json!({}), "fine");
        assert!(ok.success);
        assert_eq!(ok.status_code, 200);

        let created = ApiResponse::created(serde_json::json!({}), "made");
        assert!(created.success);
        assert_eq!(created.status_code, 201);

        let failed = ApiResponse::new(StatusCode::BAD_REQUEST, serde_json::json!({}), "nope");
        assert!(!failed.success);
    }

    #[test]
    fn test_envelope_serializes_with_camel_case_keys() {
        let envelope = ApiResponse::ok(serde_json::json!({"a": 1}), "done");
        let value = serde_json::to_value(&envelope).expect("Failed to serialize envelope");

        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["message"], "done");
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["a"], 1);
    }
}
