use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Failures talking to a backend service
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("upstream timed out: {0}")]
    Timeout(String),

    #[error("could not build upstream request: {0}")]
    InvalidRequest(String),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        let detail = error_chain(&err);
        if err.is_timeout() {
            UpstreamError::Timeout(detail)
        } else if err.is_builder() {
            UpstreamError::InvalidRequest(detail)
        } else {
            UpstreamError::Unreachable(detail)
        }
    }
}

/// reqwest keeps the useful part (refused, reset, dns) in the source chain
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

/// Errors returned to gateway clients
///
/// Auth failures share one generic message; the underlying reason is only
/// logged.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Authorization header missing")]
    MissingCredential,

    #[error("Invalid token")]
    InvalidCredential,

    #[error("Service not found")]
    ServiceNotFound(String),

    #[error("Bad Gateway: {0}")]
    Upstream(#[from] UpstreamError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingCredential | GatewayError::InvalidCredential => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::ServiceNotFound(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
