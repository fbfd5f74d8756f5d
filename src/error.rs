use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct RelayError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

#[derive(Debug, Serialize)]
pub struct HttpErrorResponse {
    error: String,
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse { error: message }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(message: &str) -> Self {
        HttpErrorResponse {
            error: message.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for RelayError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        RelayError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: HttpErrorResponse::from(err.into().to_string()),
        }
    }
}

pub type RelayResult<T, E = RelayError> = Result<T, E>;

/// Failure modes of the request pipeline. Cache store failures are absorbed
/// inside the cache layer and never reach this enum.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("audio processing failed: {0}")]
    Inference(#[source] anyhow::Error),

    #[error("text translation failed: {0}")]
    Translation(#[source] anyhow::Error),
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) | PipelineError::Unsupported(_) => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::Inference(_) | PipelineError::Translation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    // A dedicated From impl would collide with the blanket anyhow conversion.
    pub fn into_http(self) -> RelayError {
        if self.status().is_server_error() {
            tracing::error!(error = %self, "request pipeline failed");
        }
        RelayError {
            status: self.status(),
            message: HttpErrorResponse::from(self.to_string()),
        }
    }
}

#[macro_export]
macro_rules! bail_relay {
    ($error_message:expr) => {
        return Err($crate::error::RelayError { status: StatusCode::INTERNAL_SERVER_ERROR, message: $crate::error::HttpErrorResponse::from($error_message) })
    };
    ($status_code:expr, $error_message:expr) => {
        return Err($crate::error::RelayError { status: $status_code, message: $crate::error::HttpErrorResponse::from($error_message) })
    };
    ($status:expr, $fmt:expr $(, $arg:expr)*) => {
        return Err($crate::error::RelayError {
            status: $status,
            message: $crate::error::HttpErrorResponse::from(format!($fmt $(, $arg)*)),
        })
    };
}
