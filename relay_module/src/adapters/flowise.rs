//! Flowise prediction endpoint client.

use reqwest::Client;
use serde::Serialize;

use super::{ensure_success, AdapterError};

const SERVICE: &str = "flowise";

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Clone)]
pub struct FlowiseClient {
    http: Client,
    prediction_url: String,
    api_key: Option<String>,
}

impl FlowiseClient {
    pub fn new(http: Client, prediction_url: String, api_key: Option<String>) -> Self {
        Self {
            http,
            prediction_url,
            api_key,
        }
    }

    /// Ask the chatflow a question and return the `text` of its prediction.
    pub async fn predict(&self, question: &str) -> Result<String, AdapterError> {
        let mut request = self
            .http
            .post(&self.prediction_url)
            .json(&PredictionRequest { question });
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
        let body: serde_json::Value = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;

        body.get("text")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
            .ok_or_else(|| AdapterError::InvalidResponse {
                service: SERVICE,
                detail: "prediction has no text field".to_string(),
            })
    }
}
