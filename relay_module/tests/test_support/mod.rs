#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use relay_module::service::RelayConfigFile;
use relay_module::{build_router, RelayConfig, RelayState};

pub struct TestGateway {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Settings that point every upstream at one mockito server.
pub fn mock_upstream_vars(upstream_url: &str) -> Vec<(&'static str, String)> {
    vec![
        ("WHATSAPP_VERIFY_TOKEN", "verify-me".to_string()),
        ("WHATSAPP_ACCESS_TOKEN", "wa-token".to_string()),
        ("WHATSAPP_API_BASE_URL", upstream_url.to_string()),
        ("FLOWISE_PREDICTION_URL", format!("{}/api/v1/prediction/flow-1", upstream_url)),
        ("OPENAI_API_KEY", "sk-test".to_string()),
        ("OPENAI_API_BASE_URL", upstream_url.to_string()),
        ("GOOGLE_ACCESS_TOKEN", "ya29.test".to_string()),
        ("GOOGLE_DRIVE_API_BASE_URL", upstream_url.to_string()),
        ("DRIVE_WEBHOOK_CALLBACK_URL", "https://relay.example.com/gdrive/webhook".to_string()),
        ("SUPABASE_URL", upstream_url.to_string()),
        ("SUPABASE_KEY", "sb-key".to_string()),
        ("UPSTREAM_TIMEOUT_SECS", "5".to_string()),
    ]
}

pub fn config_from_vars(vars: &[(&str, String)]) -> RelayConfig {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();
    RelayConfig::resolve(RelayConfigFile::default(), &|key| map.get(key).cloned())
        .expect("valid test config")
}

pub async fn spawn_gateway(config: RelayConfig) -> TestGateway {
    let state = Arc::new(RelayState::new(config).expect("relay state"));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestGateway {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
    }
}

/// An upstream that accepts connections and never answers.
pub async fn spawn_silent_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind silent listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

pub fn text_webhook(message_id: &str, from: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550001111", "phone_number_id": "555"},
                    "contacts": [{"wa_id": from, "profile": {"name": "Tester"}}],
                    "messages": [{
                        "id": message_id,
                        "from": from,
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": {"body": body}
                    }]
                }
            }]
        }]
    })
}

pub fn audio_webhook(message_id: &str, from: &str, media_id: &str) -> serde_json::Value {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"phone_number_id": "555"},
                    "messages": [{
                        "id": message_id,
                        "from": from,
                        "timestamp": "1700000000",
                        "type": "audio",
                        "audio": {"id": media_id, "mime_type": "audio/ogg; codecs=opus"}
                    }]
                }
            }]
        }]
    })
}
