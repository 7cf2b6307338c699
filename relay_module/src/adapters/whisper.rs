//! OpenAI Whisper transcription client.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use super::{ensure_success, trim_base_url, AdapterError};

const SERVICE: &str = "whisper";

pub const DEFAULT_OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_WHISPER_MODEL: &str = "whisper-1";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Clone)]
pub struct WhisperClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl WhisperClient {
    pub fn new(http: Client, base_url: &str, api_key: String, model: String) -> Self {
        Self {
            http,
            base_url: trim_base_url(base_url),
            api_key,
            model,
        }
    }

    /// Transcribe audio bytes. `mime_type` may carry codec parameters
    /// (e.g. `audio/ogg; codecs=opus`); only the base type is sent.
    pub async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, AdapterError> {
        let base_mime = base_mime_type(mime_type);
        let part = Part::bytes(audio)
            .file_name(format!("audio.{}", file_extension(base_mime)))
            .mime_str(base_mime)
            .map_err(|e| AdapterError::ParseError(format!("invalid audio mime type: {}", e)))?;
        let form = Form::new().text("model", self.model.clone()).part("file", part);

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;
        let transcription: TranscriptionResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::from_reqwest(SERVICE, e))?;

        Ok(transcription.text.trim().to_string())
    }
}

fn base_mime_type(mime_type: &str) -> &str {
    let base = mime_type.split(';').next().unwrap_or("").trim();
    if base.is_empty() {
        "audio/ogg"
    } else {
        base
    }
}

fn file_extension(base_mime: &str) -> &'static str {
    match base_mime {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => "m4a",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" => "webm",
        "audio/amr" => "amr",
        // WhatsApp voice notes
        _ => "ogg",
    }
}
