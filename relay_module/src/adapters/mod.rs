//! Upstream adapters for the services the relay talks to.
//!
//! Every adapter wraps the shared `reqwest::Client` and reports failures as
//! [`AdapterError`], which keeps timeouts, transport failures and upstream
//! rejections apart so callers can decide what is retryable.

pub mod flowise;
pub mod google_drive;
pub mod supabase;
pub mod whatsapp;
pub mod whisper;

pub use flowise::FlowiseClient;
pub use google_drive::{extract_folder_id, folder_id_from_resource_uri, DriveFile, GoogleDriveClient};
pub use supabase::{is_valid_table_name, SupabaseClient};
pub use whatsapp::{parse_webhook, InboundMessage, MessageKind, ParsedWebhook, WhatsAppClient};
pub use whisper::WhisperClient;

/// Errors produced by upstream adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("config error: {0}")]
    ConfigError(String),
    #[error("{service} request timed out")]
    Timeout { service: &'static str },
    #[error("{service} request failed: {detail}")]
    Transport {
        service: &'static str,
        detail: String,
    },
    #[error("{service} returned {status}: {body}")]
    Rejected {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} returned an unexpected response: {detail}")]
    InvalidResponse {
        service: &'static str,
        detail: String,
    },
}

impl AdapterError {
    /// Classify a `reqwest` failure for the given upstream.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout { service }
        } else if err.is_decode() {
            AdapterError::InvalidResponse {
                service,
                detail: err.to_string(),
            }
        } else {
            AdapterError::Transport {
                service,
                detail: err.to_string(),
            }
        }
    }

    /// Whether repeating the same call later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Timeout { .. } | AdapterError::Transport { .. } => true,
            AdapterError::Rejected { status, .. } => *status == 429 || *status >= 500,
            AdapterError::ParseError(_)
            | AdapterError::ConfigError(_)
            | AdapterError::InvalidResponse { .. } => false,
        }
    }
}

/// Turn a non-2xx response into [`AdapterError::Rejected`].
pub(crate) async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!("{} returned {}: {}", service, status, body);
    Err(AdapterError::Rejected {
        service,
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn trim_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_retryability_follows_status() {
        let throttled = AdapterError::Rejected {
            service: "flowise",
            status: 429,
            body: String::new(),
        };
        let broken = AdapterError::Rejected {
            service: "flowise",
            status: 503,
            body: String::new(),
        };
        let denied = AdapterError::Rejected {
            service: "flowise",
            status: 401,
            body: String::new(),
        };
        assert!(throttled.is_retryable());
        assert!(broken.is_retryable());
        assert!(!denied.is_retryable());
        assert!(AdapterError::Timeout { service: "whisper" }.is_retryable());
        assert!(!AdapterError::ParseError("bad".to_string()).is_retryable());
    }

    #[test]
    fn trim_base_url_strips_trailing_slash() {
        assert_eq!(trim_base_url(" https://example.com/v1/ "), "https://example.com/v1");
    }
}
