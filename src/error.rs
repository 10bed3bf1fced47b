use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

/// Serialize `payload` as the JSON body of a response with `status`.
pub fn respond_with_json<T: Serialize>(status: StatusCode, payload: &T) -> Response {
    match serde_json::to_vec(payload) {
        Ok(body) => {
            let mut response = body.into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            *response.status_mut() = status;
            response
        }
        Err(err) => {
            error!("Failed to serialize response body: {}", err);
            status.into_response()
        }
    }
}

/// Wrap `msg` in an `{"error": msg}` envelope.
pub fn respond_with_error(status: StatusCode, msg: &str) -> Response {
    respond_with_json(status, &json!({ "error": msg }))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing API key")]
    MissingApiKey,
    #[error("{0}")]
    InvalidApiKey(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Internal Server Error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingApiKey | ApiError::InvalidApiKey(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        respond_with_error(self.status(), &self.to_string())
    }
}
