use std::sync::Arc;

use reqwest::Client;
use tracing::warn;

use crate::adapters::{FlowiseClient, GoogleDriveClient, SupabaseClient, WhatsAppClient, WhisperClient};
use crate::google_auth::GoogleAuth;

use super::config::RelayConfig;
use super::error::RelayError;
use super::BoxError;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub http: Client,
    pub google_auth: Option<GoogleAuth>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Result<Self, BoxError> {
        let http = Client::builder()
            .timeout(config.upstream_timeout)
            .build()?;

        let google_auth = if config.google.is_valid() {
            Some(GoogleAuth::new(config.google.clone(), http.clone())?)
        } else {
            warn!("no Google credentials configured; Drive endpoints will fail");
            None
        };

        Ok(Self {
            config: Arc::new(config),
            http,
            google_auth,
        })
    }

    pub fn whatsapp(&self) -> Result<WhatsAppClient, RelayError> {
        let token = required(&self.config.whatsapp.access_token, "WHATSAPP_ACCESS_TOKEN")?;
        Ok(WhatsAppClient::new(
            self.http.clone(),
            &self.config.whatsapp.api_base_url,
            token,
        ))
    }

    pub fn flowise(&self) -> Result<FlowiseClient, RelayError> {
        let url = required(&self.config.flowise.prediction_url, "FLOWISE_PREDICTION_URL")?;
        Ok(FlowiseClient::new(
            self.http.clone(),
            url,
            self.config.flowise.api_key.clone(),
        ))
    }

    /// `None` when no OpenAI key is configured.
    pub fn whisper(&self) -> Option<WhisperClient> {
        self.config.whisper.api_key.as_ref().map(|key| {
            WhisperClient::new(
                self.http.clone(),
                &self.config.whisper.api_base_url,
                key.clone(),
                self.config.whisper.model.clone(),
            )
        })
    }

    pub fn drive(&self) -> Result<GoogleDriveClient, RelayError> {
        let auth = self
            .google_auth
            .clone()
            .ok_or_else(|| RelayError::config("Google credentials are not configured"))?;
        Ok(GoogleDriveClient::new(
            self.http.clone(),
            &self.config.drive.api_base_url,
            auth,
        ))
    }

    pub fn supabase(&self) -> Result<SupabaseClient, RelayError> {
        let url = required(&self.config.supabase.url, "SUPABASE_URL")?;
        let key = required(&self.config.supabase.key, "SUPABASE_KEY")?;
        Ok(SupabaseClient::new(self.http.clone(), &url, key))
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String, RelayError> {
    value
        .clone()
        .ok_or_else(|| RelayError::config(format!("{} is not set", name)))
}
