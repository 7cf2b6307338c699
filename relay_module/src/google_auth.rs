//! Google OAuth 2.0 authentication management.
//!
//! This module provides OAuth 2.0 token management for the Drive API,
//! supporting pre-issued tokens, the user refresh-token flow and the
//! service account JWT bearer flow.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::adapters::AdapterError;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scope required to watch folders and list their files.
pub const GOOGLE_DRIVE_SCOPES: &[&str] = &["https://www.googleapis.com/auth/drive"];

const SERVICE: &str = "google_oauth";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Google OAuth credentials and token management.
#[derive(Debug, Clone)]
pub struct GoogleAuth {
    inner: Arc<RwLock<GoogleAuthInner>>,
    http: Client,
    token_url: String,
}

#[derive(Debug)]
struct GoogleAuthInner {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
    service_account: Option<ServiceAccountKey>,
    access_token: Option<String>,
    token_expires_at: Option<Instant>,
}

/// Service account credential fields.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
}

/// Configuration for Google OAuth.
#[derive(Debug, Clone, Default)]
pub struct GoogleAuthConfig {
    /// OAuth client ID (for user OAuth flow)
    pub client_id: Option<String>,
    /// OAuth client secret (for user OAuth flow)
    pub client_secret: Option<String>,
    /// Refresh token (for user OAuth flow)
    pub refresh_token: Option<String>,
    /// Service account credentials (alternative to OAuth)
    pub service_account: Option<ServiceAccountKey>,
    /// Pre-generated access token
    pub access_token: Option<String>,
    /// Token endpoint, overridable for tests
    pub token_url: String,
}

impl GoogleAuthConfig {
    /// Build the configuration from a key lookup (usually the process environment).
    ///
    /// Service account credentials come from `GOOGLE_SERVICE_ACCOUNT_JSON`, or
    /// from the split `GOOGLE_CLIENT_EMAIL` / `GOOGLE_PRIVATE_KEY` /
    /// `GOOGLE_PRIVATE_KEY_ID` fields.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, GoogleAuthError> {
        let service_account = match lookup("GOOGLE_SERVICE_ACCOUNT_JSON") {
            Some(json) => Some(
                serde_json::from_str::<ServiceAccountKey>(&json)
                    .map_err(|e| GoogleAuthError::JsonError(e.to_string()))?,
            ),
            None => match (lookup("GOOGLE_CLIENT_EMAIL"), lookup("GOOGLE_PRIVATE_KEY")) {
                (Some(client_email), Some(private_key)) => Some(ServiceAccountKey {
                    client_email,
                    private_key,
                    private_key_id: lookup("GOOGLE_PRIVATE_KEY_ID"),
                }),
                _ => None,
            },
        };

        Ok(Self {
            client_id: lookup("GOOGLE_CLIENT_ID"),
            client_secret: lookup("GOOGLE_CLIENT_SECRET"),
            refresh_token: lookup("GOOGLE_REFRESH_TOKEN"),
            service_account,
            access_token: lookup("GOOGLE_ACCESS_TOKEN"),
            token_url: lookup("GOOGLE_OAUTH_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        })
    }

    /// Check if the configuration is valid (has required credentials).
    pub fn is_valid(&self) -> bool {
        self.access_token.is_some()
            || self.service_account.is_some()
            || (self.client_id.is_some()
                && self.client_secret.is_some()
                && self.refresh_token.is_some())
    }
}

/// Error types for Google authentication.
#[derive(Debug, thiserror::Error)]
pub enum GoogleAuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("token refresh failed: HTTP {status}: {body}")]
    TokenRefreshFailed { status: u16, body: String },
    #[error("service account auth failed: {0}")]
    ServiceAccountAuthFailed(String),
    #[error("token request timed out")]
    Timeout,
    #[error("http error: {0}")]
    HttpError(String),
    #[error("json error: {0}")]
    JsonError(String),
}

impl From<GoogleAuthError> for AdapterError {
    fn from(err: GoogleAuthError) -> Self {
        match err {
            GoogleAuthError::MissingCredentials(detail)
            | GoogleAuthError::ServiceAccountAuthFailed(detail) => AdapterError::ConfigError(detail),
            GoogleAuthError::TokenRefreshFailed { status, body } => AdapterError::Rejected {
                service: SERVICE,
                status,
                body,
            },
            GoogleAuthError::Timeout => AdapterError::Timeout { service: SERVICE },
            GoogleAuthError::HttpError(detail) => AdapterError::Transport {
                service: SERVICE,
                detail,
            },
            GoogleAuthError::JsonError(detail) => AdapterError::InvalidResponse {
                service: SERVICE,
                detail,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ServiceAccountClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
    #[allow(dead_code)]
    token_type: Option<String>,
}

impl GoogleAuth {
    /// Create a new GoogleAuth instance from configuration.
    pub fn new(config: GoogleAuthConfig, http: Client) -> Result<Self, GoogleAuthError> {
        if !config.is_valid() {
            return Err(GoogleAuthError::MissingCredentials(
                "Either GOOGLE_ACCESS_TOKEN, service account credentials, or (GOOGLE_CLIENT_ID + GOOGLE_CLIENT_SECRET + GOOGLE_REFRESH_TOKEN) must be set".to_string(),
            ));
        }

        // Pre-generated tokens are assumed valid for 1 hour
        let (access_token, token_expires_at) = match config.access_token {
            Some(token) => (Some(token), Some(Instant::now() + Duration::from_secs(3600))),
            None => (None, None),
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(GoogleAuthInner {
                client_id: config.client_id,
                client_secret: config.client_secret,
                refresh_token: config.refresh_token,
                service_account: config.service_account,
                access_token,
                token_expires_at,
            })),
            http,
            token_url: config.token_url,
        })
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String, GoogleAuthError> {
        {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            if let (Some(token), Some(expires_at)) = (&inner.access_token, &inner.token_expires_at)
            {
                // 60 second buffer before expiration
                if *expires_at > Instant::now() + Duration::from_secs(60) {
                    return Ok(token.clone());
                }
            }
        }

        self.refresh_access_token().await
    }

    /// Force refresh the access token.
    pub async fn refresh_access_token(&self) -> Result<String, GoogleAuthError> {
        let (service_account, oauth) = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            let oauth = match (&inner.client_id, &inner.client_secret, &inner.refresh_token) {
                (Some(id), Some(secret), Some(refresh)) => {
                    Some((id.clone(), secret.clone(), refresh.clone()))
                }
                _ => None,
            };
            (inner.service_account.clone(), oauth)
        };

        let token = if let Some(key) = service_account {
            self.refresh_via_service_account(&key).await?
        } else if let Some((client_id, client_secret, refresh_token)) = oauth {
            self.refresh_via_oauth(&client_id, &client_secret, &refresh_token)
                .await?
        } else {
            return Err(GoogleAuthError::MissingCredentials(
                "No valid credentials available".to_string(),
            ));
        };

        let expires_at = Instant::now() + Duration::from_secs(token.expires_in.max(0) as u64);
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.access_token = Some(token.access_token.clone());
        inner.token_expires_at = Some(expires_at);
        Ok(token.access_token)
    }

    async fn refresh_via_oauth(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, GoogleAuthError> {
        debug!("Refreshing Google OAuth token");
        self.request_token(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn refresh_via_service_account(
        &self,
        key: &ServiceAccountKey,
    ) -> Result<OAuthTokenResponse, GoogleAuthError> {
        debug!("Requesting Google token for service account {}", key.client_email);
        let assertion = build_service_account_assertion(key, &self.token_url)?;
        self.request_token(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .await
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<OAuthTokenResponse, GoogleAuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GoogleAuthError::Timeout
                } else {
                    GoogleAuthError::HttpError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Google token request failed: {} - {}", status, body);
            return Err(GoogleAuthError::TokenRefreshFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<OAuthTokenResponse>()
            .await
            .map_err(|e| GoogleAuthError::JsonError(e.to_string()))
    }
}

/// Sign the RS256 assertion exchanged for a service account access token.
fn build_service_account_assertion(
    key: &ServiceAccountKey,
    token_url: &str,
) -> Result<String, GoogleAuthError> {
    // Keys pasted into env files usually carry literal "\n" sequences.
    let pem = key.private_key.replace("\\n", "\n");
    let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| GoogleAuthError::ServiceAccountAuthFailed(e.to_string()))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let now = Utc::now().timestamp();
    let claims = ServiceAccountClaims {
        iss: &key.client_email,
        scope: GOOGLE_DRIVE_SCOPES.join(" "),
        aud: token_url,
        iat: now,
        exp: now + 3600,
    };

    encode(&header, &claims, &encoding_key)
        .map_err(|e| GoogleAuthError::ServiceAccountAuthFailed(e.to_string()))
}
