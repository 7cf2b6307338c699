mod config;
mod db;
mod drive;
mod error;
mod server;
mod state;
mod verify;
mod whatsapp;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::{load_config_file, RelayConfig, RelayConfigFile, DEFAULT_MAX_BODY_BYTES};
pub use error::{RelayError, RELAY_FAILURE_MESSAGE};
pub use server::{build_router, run_server};
pub use state::RelayState;

/// Decode a JSON body, reporting any failure as a 400.
pub(crate) fn parse_json_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, RelayError> {
    serde_json::from_slice(body).map_err(|err| RelayError::Validation(format!("invalid JSON body: {}", err)))
}
