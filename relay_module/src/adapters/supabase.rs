use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::sync::LazyLock;

use super::{ensure_success, trim_base_url, AdapterError};

const SERVICE: &str = "supabase";

static TABLE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid table name pattern"));

/// Table names become a URL path segment, so only plain identifiers pass.
pub fn is_valid_table_name(table: &str) -> bool {
    TABLE_NAME_PATTERN.is_match(table)
}

/// PostgREST client for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: Client,
    project_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(http: Client, project_url: &str, service_key: String) -> Self {
        Self {
            http,
            project_url: trim_base_url(project_url),
            service_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.project_url, table)
    }

    /// Insert `data` (an object or an array of objects) and return the stored rows.
    pub async fn insert(&self, table: &str, data: &Value) -> Result<Value, AdapterError> {
        if !is_valid_table_name(table) {
            return Err(AdapterError::ParseError(format!("invalid table name: {}", table)));
        }

        let response = self
            .http
            .post(self.table_url(table))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;

        let response = ensure_success(SERVICE, response).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
        if body.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        serde_json::from_str(&body).map_err(|e| AdapterError::InvalidResponse {
            service: SERVICE,
            detail: e.to_string(),
        })
    }
}
