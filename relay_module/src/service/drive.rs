use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::adapters::google_drive::WatchRequest;
use crate::adapters::{extract_folder_id, folder_id_from_resource_uri};

use super::error::RelayError;
use super::parse_json_body;
use super::state::RelayState;
use super::verify::verify_drive_channel;

#[derive(Debug, Deserialize)]
pub(super) struct SetupWatchRequest {
    #[serde(default)]
    pub folder_url: Option<String>,
}

/// Register a Drive push channel on the folder named by `folder_url`.
pub(super) async fn setup_watch(
    State(state): State<Arc<RelayState>>,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let request: SetupWatchRequest = parse_json_body(&body)?;
    let folder_url = request
        .folder_url
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| RelayError::Validation("folder_url is required".to_string()))?;
    let folder_id = extract_folder_id(&folder_url)
        .ok_or_else(|| RelayError::Validation("could not find a folder id in folder_url".to_string()))?
        .to_string();

    let callback_url = state
        .config
        .drive
        .callback_url
        .clone()
        .ok_or_else(|| RelayError::config("DRIVE_WEBHOOK_CALLBACK_URL is not set"))?;
    let drive = state.drive()?;

    let watch = WatchRequest::web_hook(
        &callback_url,
        state.config.drive.channel_token.clone(),
        Utc::now().timestamp_millis(),
    );
    let channel = drive
        .watch_folder(&folder_id, &watch)
        .await
        .map_err(|err| RelayError::upstream("failed to set up folder watch", err))?;

    info!(
        "drive watch registered folder_id={} channel_id={} expiration={:?}",
        folder_id, channel.id, channel.expiration
    );
    Ok(Json(json!({
        "status": "success",
        "folder_id": folder_id,
        "channel": channel,
    })))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Receive a Drive change notification. Always acknowledged once the channel
/// checks out; listing failures are only logged.
pub(super) async fn drive_notification(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    verify_drive_channel(&headers, state.config.drive.channel_token.as_deref())
        .map_err(RelayError::Forbidden)?;

    let resource_state = header_str(&headers, "x-goog-resource-state").unwrap_or("");
    if resource_state == "sync" {
        info!(
            "drive channel sync channel_id={}",
            header_str(&headers, "x-goog-channel-id").unwrap_or("unknown")
        );
        return Ok(received());
    }

    let resource_id = header_str(&headers, "x-goog-resource-id").unwrap_or("unknown");
    let Some(folder_id) = header_str(&headers, "x-goog-resource-uri").and_then(folder_id_from_resource_uri)
    else {
        warn!(
            "drive notification state={} resource_id={} without a file resource uri",
            resource_state, resource_id
        );
        return Ok(received());
    };

    match resource_state {
        "add" => info!("drive folder {} gained a file (resource {})", folder_id, resource_id),
        "remove" => info!("drive folder {} lost a file (resource {})", folder_id, resource_id),
        "update" => info!("drive folder {} updated (resource {})", folder_id, resource_id),
        "trash" => info!("drive folder {} trashed (resource {})", folder_id, resource_id),
        "untrash" => info!("drive folder {} restored (resource {})", folder_id, resource_id),
        "change" => info!("drive folder {} changed (resource {})", folder_id, resource_id),
        other => info!("drive folder {} state={} (resource {})", folder_id, other, resource_id),
    }

    let drive = match state.drive() {
        Ok(drive) => drive,
        Err(err) => {
            error!("cannot list drive folder {}: {}", folder_id, err);
            return Ok(received());
        }
    };
    match drive.list_folder_files(&folder_id).await {
        Ok(files) => {
            info!("drive folder {} holds {} files", folder_id, files.len());
            for file in &files {
                info!(
                    "drive file name={} id={}",
                    file.name.as_deref().unwrap_or("<unnamed>"),
                    file.id
                );
            }
        }
        Err(err) => error!("listing drive folder {} failed: {}", folder_id, err),
    }

    Ok(received())
}

fn received() -> Response {
    (StatusCode::OK, Json(json!({"status": "received"}))).into_response()
}
