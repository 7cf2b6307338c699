use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapters::google_drive::DEFAULT_DRIVE_API_BASE_URL;
use crate::adapters::whatsapp::DEFAULT_GRAPH_API_BASE_URL;
use crate::adapters::whisper::{DEFAULT_OPENAI_API_BASE_URL, DEFAULT_WHISPER_MODEL};
use crate::google_auth::GoogleAuthConfig;

use super::BoxError;

pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize, Default)]
pub struct RelayConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub flowise: FlowiseSection,
    #[serde(default)]
    pub drive: DriveSection,
    #[serde(default)]
    pub upstream: UpstreamSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_body_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct FlowiseSection {
    pub prediction_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DriveSection {
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpstreamSection {
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct WhatsAppSettings {
    /// Secret echoed back by Meta during the subscription handshake
    pub verify_token: Option<String>,
    /// Graph API bearer token
    pub access_token: Option<String>,
    /// Fallback sender id when a webhook carries no metadata
    pub phone_number_id: Option<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct FlowiseSettings {
    pub prediction_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WhisperSettings {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct DriveSettings {
    pub api_base_url: String,
    /// Public url Drive posts change notifications to
    pub callback_url: Option<String>,
    /// Shared secret attached to watch channels and checked on notifications
    pub channel_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub upstream_timeout: Duration,
    pub whatsapp: WhatsAppSettings,
    pub flowise: FlowiseSettings,
    pub whisper: WhisperSettings,
    pub google: GoogleAuthConfig,
    pub drive: DriveSettings,
    pub supabase: SupabaseSettings,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let file = match resolve_config_path() {
            Some(path) => load_config_file(&path)?,
            None => RelayConfigFile::default(),
        };
        Self::resolve(file, &env_value)
    }

    /// Merge a config file with key lookups; lookups win.
    pub fn resolve(
        file: RelayConfigFile,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, BoxError> {
        let host = lookup("RELAY_HOST")
            .or(file.server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup("RELAY_PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|err| format!("invalid RELAY_PORT {}: {}", value, err))?,
            None => file.server.port.unwrap_or(9200),
        };
        let max_body_bytes = lookup("RELAY_MAX_BODY_BYTES")
            .and_then(|value| value.parse::<usize>().ok())
            .or(file.server.max_body_bytes)
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);
        let upstream_timeout = lookup("UPSTREAM_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(file.upstream.timeout_secs)
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT);

        let google = GoogleAuthConfig::from_lookup(lookup)?;

        Ok(Self {
            host,
            port,
            max_body_bytes,
            upstream_timeout,
            whatsapp: WhatsAppSettings {
                verify_token: lookup("WHATSAPP_VERIFY_TOKEN"),
                access_token: lookup("WHATSAPP_ACCESS_TOKEN"),
                phone_number_id: lookup("WHATSAPP_PHONE_NUMBER_ID"),
                api_base_url: lookup("WHATSAPP_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GRAPH_API_BASE_URL.to_string()),
            },
            flowise: FlowiseSettings {
                prediction_url: lookup("FLOWISE_PREDICTION_URL").or(file.flowise.prediction_url),
                api_key: lookup("FLOWISE_API_KEY"),
            },
            whisper: WhisperSettings {
                api_key: lookup("OPENAI_API_KEY"),
                api_base_url: lookup("OPENAI_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE_URL.to_string()),
                model: lookup("WHISPER_MODEL").unwrap_or_else(|| DEFAULT_WHISPER_MODEL.to_string()),
            },
            google,
            drive: DriveSettings {
                api_base_url: lookup("GOOGLE_DRIVE_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_DRIVE_API_BASE_URL.to_string()),
                callback_url: lookup("DRIVE_WEBHOOK_CALLBACK_URL").or(file.drive.callback_url),
                channel_token: lookup("DRIVE_CHANNEL_TOKEN"),
            },
            supabase: SupabaseSettings {
                url: lookup("SUPABASE_URL"),
                key: lookup("SUPABASE_KEY"),
            },
        })
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Some(path) = env_value("RELAY_CONFIG_PATH") {
        return Some(PathBuf::from(path));
    }

    let direct = env::current_dir().ok()?.join("relay.toml");
    direct.exists().then_some(direct)
}

pub fn load_config_file(path: &Path) -> Result<RelayConfigFile, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read relay config {}: {}", path.display(), err))?;
    toml::from_str::<RelayConfigFile>(&content)
        .map_err(|err| format!("failed to parse relay config: {}", err))
}
