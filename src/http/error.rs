use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::CatteryError;

/// Library error as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub CatteryError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<CatteryError> for ApiError {
    fn from(err: CatteryError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            CatteryError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CatteryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self.0 {
            CatteryError::Rejected(rejection) => serde_json::json!({
                "error": "Relationship rejected",
                "reason": rejection.reason(),
                "rule": rejection,
            }),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                log::error!("Request failed: {}", self.0);
                serde_json::json!({ "error": "Internal server error" })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
