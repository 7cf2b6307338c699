//! Google Drive adapter for folder watch channels and file listings.

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::{ensure_success, trim_base_url, AdapterError};
use crate::google_auth::GoogleAuth;

const SERVICE: &str = "google_drive";

pub const DEFAULT_DRIVE_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Drive ids are long runs of URL-safe characters.
static FOLDER_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-A-Za-z0-9_]{25,}").expect("valid folder id pattern"));

static RESOURCE_FILE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/files/([^/?#]+)").expect("valid resource uri pattern"));

/// Pull the folder id out of a user supplied Drive folder url.
pub fn extract_folder_id(folder_url: &str) -> Option<&str> {
    FOLDER_ID_PATTERN
        .find(folder_url)
        .map(|found| found.as_str())
}

/// Pull the file id out of an `X-Goog-Resource-URI` header value.
pub fn folder_id_from_resource_uri(resource_uri: &str) -> Option<String> {
    RESOURCE_FILE_ID_PATTERN
        .captures(resource_uri)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().to_string())
}

/// Body of a `files.watch` request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WatchRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl WatchRequest {
    /// A web hook channel whose id is derived from the current time.
    pub fn web_hook(address: &str, token: Option<String>, now_millis: i64) -> Self {
        Self {
            id: format!("folder-watch-{}", now_millis),
            channel_type: "web_hook".to_string(),
            address: address.to_string(),
            token,
        }
    }
}

/// Channel record returned by Drive after a successful watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchChannel {
    pub kind: Option<String>,
    pub id: String,
    #[serde(rename = "resourceId")]
    pub resource_id: Option<String>,
    #[serde(rename = "resourceUri")]
    pub resource_uri: Option<String>,
    pub expiration: Option<String>,
}

/// Google Drive file metadata
#[derive(Debug, Clone, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// Response from Google Drive API files.list
#[derive(Debug, Clone, Deserialize)]
struct FilesListResponse {
    files: Option<Vec<DriveFile>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleDriveClient {
    http: Client,
    base_url: String,
    auth: GoogleAuth,
}

impl GoogleDriveClient {
    pub fn new(http: Client, base_url: &str, auth: GoogleAuth) -> Self {
        Self {
            http,
            base_url: trim_base_url(base_url),
            auth,
        }
    }

    /// Register a push notification channel on a folder.
    pub async fn watch_folder(
        &self,
        folder_id: &str,
        request: &WatchRequest,
    ) -> Result<WatchChannel, AdapterError> {
        let access_token = self.auth.get_access_token().await?;
        let url = format!(
            "{}/files/{}/watch",
            self.base_url,
            urlencoding::encode(folder_id)
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
        ensure_success(SERVICE, response)
            .await?
            .json::<WatchChannel>()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))
    }

    /// List every non-trashed file whose parent is `folder_id`, following pagination.
    pub async fn list_folder_files(&self, folder_id: &str) -> Result<Vec<DriveFile>, AdapterError> {
        let access_token = self.auth.get_access_token().await?;
        let query = format!("'{}' in parents and trashed = false", folder_id.replace('\'', "\\'"));

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!(
                "{}/files?q={}&fields=nextPageToken,files(id,name,mimeType)",
                self.base_url,
                urlencoding::encode(&query)
            );
            if let Some(token) = page_token.as_deref() {
                url.push_str("&pageToken=");
                url.push_str(&urlencoding::encode(token));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(&access_token)
                .send()
                .await
                .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
            let page: FilesListResponse = ensure_success(SERVICE, response)
                .await?
                .json()
                .await
                .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;

            files.extend(page.files.unwrap_or_default());
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }
}
