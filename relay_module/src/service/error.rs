use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info};

use crate::adapters::AdapterError;

/// Generic message reported to callers when a relay chain fails upstream.
pub const RELAY_FAILURE_MESSAGE: &str = "Error querying the API";

/// Request-level failures, each mapped to one HTTP response shape.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("configuration error: {detail}")]
    Config {
        detail: String,
        public: Option<&'static str>,
    },
    #[error("{message}: {source}")]
    Upstream {
        message: &'static str,
        #[source]
        source: AdapterError,
    },
}

impl RelayError {
    pub fn config(detail: impl Into<String>) -> Self {
        RelayError::Config {
            detail: detail.into(),
            public: None,
        }
    }

    /// Report a configuration failure under `message`, keeping its code.
    pub fn reported_as(self, message: &'static str) -> Self {
        match self {
            RelayError::Config { detail, .. } => RelayError::Config {
                detail,
                public: Some(message),
            },
            other => other,
        }
    }

    /// Wrap an adapter failure with the message callers should see.
    /// Parse and config failures keep their own variants.
    pub fn upstream(message: &'static str, source: AdapterError) -> Self {
        match source {
            AdapterError::ParseError(detail) => RelayError::Validation(detail),
            AdapterError::ConfigError(detail) => RelayError::config(detail),
            source => RelayError::Upstream { message, source },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::Forbidden(_) => StatusCode::FORBIDDEN,
            RelayError::Config { .. } | RelayError::Upstream { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation_error",
            RelayError::Forbidden(_) => "forbidden",
            RelayError::Config { .. } => "configuration_error",
            RelayError::Upstream { source, .. } => match source {
                AdapterError::Timeout { .. } => "upstream_timeout",
                AdapterError::Transport { .. } => "upstream_unavailable",
                AdapterError::Rejected { .. } => "upstream_rejected",
                AdapterError::InvalidResponse { .. } => "upstream_invalid_response",
                AdapterError::ParseError(_) => "validation_error",
                AdapterError::ConfigError(_) => "configuration_error",
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Upstream { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    fn public_message(&self) -> String {
        match self {
            RelayError::Validation(detail) => detail.clone(),
            RelayError::Forbidden(reason) => reason.to_string(),
            RelayError::Config { public, .. } => public
                .unwrap_or("service is not configured for this request")
                .to_string(),
            RelayError::Upstream { message, .. } => message.to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("relay request failed: {}", self);
        } else {
            info!("relay request rejected: {}", self);
        }

        let body = json!({
            "status": "error",
            "error": self.code(),
            "message": self.public_message(),
            "retryable": self.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}
