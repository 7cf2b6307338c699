//! WhatsApp adapter for inbound webhooks and outbound calls via Meta Cloud API.
//!
//! - [`parse_webhook`]: walks a webhook envelope and normalizes every message
//! - [`WhatsAppClient`]: replies, read receipts and media downloads via Graph API

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{ensure_success, trim_base_url, AdapterError};

const SERVICE: &str = "whatsapp";

pub const DEFAULT_GRAPH_API_BASE_URL: &str = "https://graph.facebook.com/v17.0";

/// Type tag of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Audio,
    Other(String),
}

impl MessageKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "text" => MessageKind::Text,
            "audio" => MessageKind::Audio,
            other => MessageKind::Other(other.to_string()),
        }
    }
}

/// Audio attachment reference carried by an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioReference {
    pub media_id: String,
    pub mime_type: Option<String>,
}

/// A single normalized message taken out of a webhook envelope.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: String,
    pub sender_name: Option<String>,
    pub message_id: String,
    pub timestamp: String,
    pub kind: MessageKind,
    pub text_body: Option<String>,
    pub audio: Option<AudioReference>,
    /// Business phone number that received the message.
    pub phone_number_id: Option<String>,
}

/// Everything the relay needs from one webhook delivery.
#[derive(Debug, Clone, Default)]
pub struct ParsedWebhook {
    pub messages: Vec<InboundMessage>,
    pub status_updates: usize,
}

/// Parse a raw webhook body, visiting every entry, change and message in order.
pub fn parse_webhook(raw_payload: &[u8]) -> Result<ParsedWebhook, AdapterError> {
    let webhook: WhatsAppWebhook = serde_json::from_slice(raw_payload)
        .map_err(|e| AdapterError::ParseError(format!("invalid message structure: {}", e)))?;

    if webhook.entry.is_empty() {
        return Err(AdapterError::ParseError(
            "invalid message structure: no entry in webhook".to_string(),
        ));
    }

    let mut parsed = ParsedWebhook::default();
    let mut saw_value = false;

    for entry in &webhook.entry {
        for change in &entry.changes {
            let Some(value) = change.value.as_ref() else {
                continue;
            };
            saw_value = true;
            parsed.status_updates += value.statuses.len();

            let phone_number_id = value
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.phone_number_id.clone());

            for message in &value.messages {
                let sender_name = value
                    .contacts
                    .iter()
                    .find(|contact| contact.wa_id == message.from)
                    .or_else(|| value.contacts.first())
                    .and_then(|contact| contact.profile.as_ref())
                    .map(|profile| profile.name.clone());

                parsed.messages.push(InboundMessage {
                    sender: message.from.clone(),
                    sender_name,
                    message_id: message.id.clone(),
                    timestamp: message.timestamp.clone(),
                    kind: MessageKind::from_tag(&message.message_type),
                    text_body: message.text.as_ref().map(|text| text.body.clone()),
                    audio: message.audio.as_ref().map(|media| AudioReference {
                        media_id: media.id.clone(),
                        mime_type: media.mime_type.clone(),
                    }),
                    phone_number_id: phone_number_id.clone(),
                });
            }
        }
    }

    if !saw_value {
        return Err(AdapterError::ParseError(
            "invalid message structure: no changes in entry".to_string(),
        ));
    }
    if parsed.messages.is_empty() && parsed.status_updates == 0 {
        return Err(AdapterError::ParseError(
            "invalid message structure: no messages in webhook".to_string(),
        ));
    }

    Ok(parsed)
}

/// Media metadata returned by `GET /{media_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaMetadata {
    pub url: String,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Graph API client bound to one access token.
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl WhatsAppClient {
    pub fn new(http: Client, base_url: &str, access_token: String) -> Self {
        Self {
            http,
            base_url: trim_base_url(base_url),
            access_token,
        }
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!("{}/{}/messages", self.base_url, phone_number_id)
    }

    /// Send a text reply threaded under `context_message_id`.
    /// Returns the id WhatsApp assigned to the outbound message.
    pub async fn send_text_reply(
        &self,
        phone_number_id: &str,
        to: &str,
        body: &str,
        context_message_id: &str,
    ) -> Result<String, AdapterError> {
        let request = WhatsAppSendMessageRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            message_type: "text",
            text: WhatsAppTextContent { body },
            context: Some(WhatsAppContext {
                message_id: context_message_id,
            }),
        };

        let response = self
            .http
            .post(self.messages_url(phone_number_id))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
        let body: serde_json::Value = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;

        let message_id = body["messages"][0]["id"]
            .as_str()
            .unwrap_or("")
            .to_string();
        debug!("whatsapp reply sent to {} id={}", to, message_id);
        Ok(message_id)
    }

    /// Mark an inbound message as read.
    pub async fn mark_as_read(
        &self,
        phone_number_id: &str,
        message_id: &str,
    ) -> Result<(), AdapterError> {
        let request = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
        });

        let response = self
            .http
            .post(self.messages_url(phone_number_id))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
        ensure_success(SERVICE, response).await?;
        Ok(())
    }

    /// Resolve a media id to its short-lived download url.
    pub async fn fetch_media_metadata(&self, media_id: &str) -> Result<MediaMetadata, AdapterError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, media_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
        ensure_success(SERVICE, response)
            .await?
            .json::<MediaMetadata>()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))
    }

    /// Download media bytes. The url comes from [`Self::fetch_media_metadata`]
    /// and still requires the bearer token.
    pub async fn download_media(&self, url: &str) -> Result<Vec<u8>, AdapterError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
        let bytes = ensure_success(SERVICE, response)
            .await?
            .bytes()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
        Ok(bytes.to_vec())
    }
}

// ============================================================================
// WhatsApp Webhook types (Inbound)
// ============================================================================

/// Root webhook payload from WhatsApp
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppWebhook {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WhatsAppEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WhatsAppChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppChange {
    #[serde(default)]
    pub value: Option<WhatsAppValue>,
    #[serde(default)]
    pub field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppValue {
    #[serde(default)]
    pub messaging_product: String,
    #[serde(default)]
    pub metadata: Option<WhatsAppMetadata>,
    #[serde(default)]
    pub contacts: Vec<WhatsAppContact>,
    #[serde(default)]
    pub messages: Vec<WhatsAppMessage>,
    #[serde(default)]
    pub statuses: Vec<WhatsAppStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMetadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppContact {
    #[serde(default)]
    pub wa_id: String,
    pub profile: Option<WhatsAppProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppProfile {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<WhatsAppText>,
    #[serde(default)]
    pub audio: Option<WhatsAppMedia>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppText {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppMedia {
    pub id: String,
    pub mime_type: Option<String>,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppStatus {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub recipient_id: String,
}

// ============================================================================
// WhatsApp Send types (Outbound)
// ============================================================================

#[derive(Debug, Serialize)]
struct WhatsAppSendMessageRequest<'a> {
    messaging_product: &'a str,
    recipient_type: &'a str,
    to: &'a str,
    #[serde(rename = "type")]
    message_type: &'a str,
    text: WhatsAppTextContent<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<WhatsAppContext<'a>>,
}

#[derive(Debug, Serialize)]
struct WhatsAppTextContent<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct WhatsAppContext<'a> {
    message_id: &'a str,
}
