use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::adapters::whatsapp::AudioReference;
use crate::adapters::{parse_webhook, InboundMessage, MessageKind, WhatsAppClient};

use super::error::{RelayError, RELAY_FAILURE_MESSAGE};
use super::state::RelayState;
use super::verify::verify_whatsapp_subscription;

/// Query parameters for WhatsApp webhook verification
#[derive(Debug, Deserialize)]
pub(super) struct WhatsAppVerifyParams {
    #[serde(rename = "hub.mode")]
    pub hub_mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub hub_verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub hub_challenge: Option<String>,
}

/// Handle WhatsApp webhook verification (GET request)
pub(super) async fn verify_whatsapp_webhook(
    State(state): State<Arc<RelayState>>,
    Query(params): Query<WhatsAppVerifyParams>,
) -> impl IntoResponse {
    match verify_whatsapp_subscription(
        state.config.whatsapp.verify_token.as_deref(),
        params.hub_mode.as_deref(),
        params.hub_verify_token.as_deref(),
        params.hub_challenge.as_deref(),
    ) {
        Ok(challenge) => (StatusCode::OK, challenge),
        Err(reason) => {
            info!("whatsapp webhook verification failed: {}", reason);
            (StatusCode::FORBIDDEN, reason.to_string())
        }
    }
}

/// What happened to a single inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageOutcome {
    Relayed,
    NoText,
    Ignored,
}

/// Handle WhatsApp inbound messages (POST request)
pub(super) async fn ingest_whatsapp(
    State(state): State<Arc<RelayState>>,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let parsed = parse_webhook(&body).map_err(|err| {
        debug!("rejecting whatsapp payload: {}", err);
        RelayError::Validation("invalid message structure".to_string())
    })?;

    if parsed.messages.is_empty() {
        debug!(
            "whatsapp webhook carried {} status updates and no messages",
            parsed.status_updates
        );
        return Ok(Json(json!({"status": "ignored"})));
    }

    let mut processed = 0usize;
    let mut ignored = 0usize;
    for message in &parsed.messages {
        let outcome = handle_message(&state, message)
            .await
            .map_err(|err| err.reported_as(RELAY_FAILURE_MESSAGE))?;
        match outcome {
            MessageOutcome::Relayed | MessageOutcome::NoText => processed += 1,
            MessageOutcome::Ignored => ignored += 1,
        }
    }

    Ok(Json(json!({
        "status": "success",
        "processed": processed,
        "ignored": ignored,
    })))
}

async fn handle_message(
    state: &RelayState,
    message: &InboundMessage,
) -> Result<MessageOutcome, RelayError> {
    info!(
        "whatsapp message id={} from={} type={:?}",
        message.message_id, message.sender, message.kind
    );

    let text = match &message.kind {
        MessageKind::Text => message.text_body.clone(),
        MessageKind::Audio => match &message.audio {
            Some(audio) => transcribe_audio(state, audio).await?,
            None => {
                warn!("audio message {} has no media reference", message.message_id);
                None
            }
        },
        MessageKind::Other(tag) => {
            debug!("ignoring whatsapp message {} of type {}", message.message_id, tag);
            return Ok(MessageOutcome::Ignored);
        }
    };

    match text.filter(|value| !value.trim().is_empty()) {
        Some(text) => {
            relay_text(state, message, &text).await?;
            Ok(MessageOutcome::Relayed)
        }
        None => Ok(MessageOutcome::NoText),
    }
}

/// Download the voice note and transcribe it. Transcription failures are
/// logged and yield `None`; media download failures abort the request.
async fn transcribe_audio(
    state: &RelayState,
    audio: &AudioReference,
) -> Result<Option<String>, RelayError> {
    let Some(whisper) = state.whisper() else {
        warn!("OPENAI_API_KEY not set; skipping transcription of {}", audio.media_id);
        return Ok(None);
    };
    let whatsapp = state.whatsapp()?;

    let metadata = whatsapp
        .fetch_media_metadata(&audio.media_id)
        .await
        .map_err(|err| RelayError::upstream(RELAY_FAILURE_MESSAGE, err))?;
    let bytes = whatsapp
        .download_media(&metadata.url)
        .await
        .map_err(|err| RelayError::upstream(RELAY_FAILURE_MESSAGE, err))?;

    let mime_type = audio
        .mime_type
        .as_deref()
        .or(metadata.mime_type.as_deref())
        .unwrap_or("audio/ogg");
    match whisper.transcribe(bytes, mime_type).await {
        Ok(transcript) => {
            debug!("transcribed {} into {} chars", audio.media_id, transcript.len());
            Ok(Some(transcript))
        }
        Err(err) => {
            warn!("transcription of {} failed: {}", audio.media_id, err);
            Ok(None)
        }
    }
}

/// Prediction, reply, read receipt. Any failure aborts the chain.
async fn relay_text(
    state: &RelayState,
    message: &InboundMessage,
    text: &str,
) -> Result<(), RelayError> {
    let flowise = state.flowise()?;
    let whatsapp = state.whatsapp()?;
    let phone_number_id = message
        .phone_number_id
        .clone()
        .or_else(|| state.config.whatsapp.phone_number_id.clone())
        .ok_or_else(|| RelayError::config("WHATSAPP_PHONE_NUMBER_ID is not set"))?;

    let prediction = flowise
        .predict(text)
        .await
        .map_err(|err| RelayError::upstream(RELAY_FAILURE_MESSAGE, err))?;

    send_reply(&whatsapp, &phone_number_id, message, &prediction).await
}

async fn send_reply(
    whatsapp: &WhatsAppClient,
    phone_number_id: &str,
    message: &InboundMessage,
    prediction: &str,
) -> Result<(), RelayError> {
    let reply_id = whatsapp
        .send_text_reply(phone_number_id, &message.sender, prediction, &message.message_id)
        .await
        .map_err(|err| RelayError::upstream(RELAY_FAILURE_MESSAGE, err))?;
    whatsapp
        .mark_as_read(phone_number_id, &message.message_id)
        .await
        .map_err(|err| RelayError::upstream(RELAY_FAILURE_MESSAGE, err))?;

    info!(
        "relayed prediction to {} reply_id={} in_reply_to={}",
        message.sender, reply_id, message.message_id
    );
    Ok(())
}
