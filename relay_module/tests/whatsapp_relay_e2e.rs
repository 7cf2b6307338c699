mod test_support;

use mockito::{Matcher, Server};
use serde_json::{json, Value};

use test_support::{
    audio_webhook, config_from_vars, mock_upstream_vars, spawn_gateway, spawn_silent_upstream,
    text_webhook,
};

#[tokio::test]
async fn verification_echoes_challenge() -> Result<(), Box<dyn std::error::Error>> {
    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars("http://127.0.0.1:9"))).await;

    let response = gateway
        .client
        .get(gateway.url("/whatsapp/webhook"))
        .query(&[
            ("hub.mode", "subscribe"),
            ("hub.verify_token", "verify-me"),
            ("hub.challenge", "1158201444"),
        ])
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, "1158201444");
    Ok(())
}

#[tokio::test]
async fn verification_rejects_wrong_or_empty_token() -> Result<(), Box<dyn std::error::Error>> {
    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars("http://127.0.0.1:9"))).await;

    for token in ["nope", ""] {
        let response = gateway
            .client
            .get(gateway.url("/whatsapp/webhook"))
            .query(&[
                ("hub.mode", "subscribe"),
                ("hub.verify_token", token),
                ("hub.challenge", "abc"),
            ])
            .send()
            .await?;
        assert_eq!(response.status(), 403, "token {:?}", token);
    }

    let response = gateway
        .client
        .get(gateway.url("/whatsapp/webhook"))
        .query(&[("hub.mode", "subscribe"), ("hub.challenge", "abc")])
        .send()
        .await?;
    assert_eq!(response.status(), 403);
    Ok(())
}

#[tokio::test]
async fn empty_entry_list_is_bad_request() -> Result<(), Box<dyn std::error::Error>> {
    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars("http://127.0.0.1:9"))).await;

    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&json!({"object": "whatsapp_business_account", "entry": []}))
        .send()
        .await?;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "invalid message structure");
    assert_eq!(body["error"], "validation_error");
    Ok(())
}

#[tokio::test]
async fn status_only_webhook_is_ignored() -> Result<(), Box<dyn std::error::Error>> {
    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars("http://127.0.0.1:9"))).await;

    let payload = json!({
        "object": "whatsapp_business_account",
        "entry": [{"id": "1", "changes": [{"field": "messages", "value": {
            "metadata": {"phone_number_id": "555"},
            "statuses": [{"id": "wamid.1", "status": "read", "timestamp": "1", "recipient_id": "4412"}]
        }}]}]
    });
    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&payload)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "ignored");
    Ok(())
}

#[tokio::test]
async fn text_message_relays_prediction_then_reply_and_read_receipt(
) -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;

    let prediction = server
        .mock("POST", "/api/v1/prediction/flow-1")
        .match_body(Matcher::PartialJson(json!({"question": "what are your hours?"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text":"We open at 9am.","chatId":"c-1"}"#)
        .expect(1)
        .create_async()
        .await;
    let reply = server
        .mock("POST", "/555/messages")
        .match_header("authorization", "Bearer wa-token")
        .match_body(Matcher::PartialJson(json!({
            "messaging_product": "whatsapp",
            "to": "4412",
            "type": "text",
            "text": {"body": "We open at 9am."},
            "context": {"message_id": "wamid.in-1"}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messages":[{"id":"wamid.out-1"}]}"#)
        .expect(1)
        .create_async()
        .await;
    let read_receipt = server
        .mock("POST", "/555/messages")
        .match_header("authorization", "Bearer wa-token")
        .match_body(Matcher::PartialJson(json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": "wamid.in-1"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":true}"#)
        .expect(1)
        .create_async()
        .await;

    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars(&server.url()))).await;
    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&text_webhook("wamid.in-1", "4412", "what are your hours?"))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "success");
    assert_eq!(body["processed"], 1);

    prediction.assert_async().await;
    reply.assert_async().await;
    read_receipt.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn every_message_in_the_envelope_is_relayed() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;

    let prediction = server
        .mock("POST", "/api/v1/prediction/flow-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text":"ok"}"#)
        .expect(2)
        .create_async()
        .await;
    let outbound = server
        .mock("POST", "/555/messages")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messages":[{"id":"wamid.out"}]}"#)
        .expect(4)
        .create_async()
        .await;

    let mut payload = text_webhook("wamid.a", "4412", "first");
    payload["entry"][0]["changes"][0]["value"]["messages"]
        .as_array_mut()
        .expect("messages array")
        .extend([
            json!({"id": "wamid.b", "from": "4413", "timestamp": "1", "type": "text", "text": {"body": "second"}}),
            json!({"id": "wamid.c", "from": "4414", "timestamp": "1", "type": "sticker"}),
        ]);

    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars(&server.url()))).await;
    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&payload)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["processed"], 2);
    assert_eq!(body["ignored"], 1);

    prediction.assert_async().await;
    outbound.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn prediction_failure_reports_generic_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;

    let _prediction = server
        .mock("POST", "/api/v1/prediction/flow-1")
        .with_status(503)
        .with_body("flow offline")
        .create_async()
        .await;
    let outbound = server
        .mock("POST", "/555/messages")
        .expect(0)
        .create_async()
        .await;

    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars(&server.url()))).await;
    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&text_webhook("wamid.in-2", "4412", "hello"))
        .send()
        .await?;

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "Error querying the API");
    assert_eq!(body["error"], "upstream_rejected");
    assert_eq!(body["retryable"], true);

    outbound.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn failed_read_receipt_fails_the_request() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;

    let _prediction = server
        .mock("POST", "/api/v1/prediction/flow-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text":"sure"}"#)
        .create_async()
        .await;
    let reply = server
        .mock("POST", "/555/messages")
        .match_body(Matcher::PartialJson(json!({"type": "text"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messages":[{"id":"wamid.out"}]}"#)
        .expect(1)
        .create_async()
        .await;
    let _read_receipt = server
        .mock("POST", "/555/messages")
        .match_body(Matcher::PartialJson(json!({"status": "read"})))
        .with_status(400)
        .with_body(r#"{"error":{"message":"Invalid parameter"}}"#)
        .create_async()
        .await;

    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars(&server.url()))).await;
    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&text_webhook("wamid.in-3", "4412", "hello"))
        .send()
        .await?;

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await?;
    assert_eq!(body["retryable"], false);
    reply.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn audio_message_fetches_media_then_transcribes() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;
    let base = server.url();

    let metadata = server
        .mock("GET", "/media-1")
        .match_header("authorization", "Bearer wa-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "url": format!("{}/download/media-1", base),
                "mime_type": "audio/ogg",
                "file_size": 4
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let download = server
        .mock("GET", "/download/media-1")
        .match_header("authorization", "Bearer wa-token")
        .with_status(200)
        .with_header("content-type", "audio/ogg")
        .with_body(vec![0x4f, 0x67, 0x67, 0x53])
        .expect(1)
        .create_async()
        .await;
    let transcription = server
        .mock("POST", "/audio/transcriptions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::Regex("whisper-1".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text":" book a table for two "}"#)
        .expect(1)
        .create_async()
        .await;
    let prediction = server
        .mock("POST", "/api/v1/prediction/flow-1")
        .match_body(Matcher::PartialJson(json!({"question": "book a table for two"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text":"Booked."}"#)
        .expect(1)
        .create_async()
        .await;
    let outbound = server
        .mock("POST", "/555/messages")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"messages":[{"id":"wamid.out"}]}"#)
        .expect(2)
        .create_async()
        .await;

    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars(&server.url()))).await;
    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&audio_webhook("wamid.voice-1", "4412", "media-1"))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    metadata.assert_async().await;
    download.assert_async().await;
    transcription.assert_async().await;
    prediction.assert_async().await;
    outbound.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn transcription_failure_is_swallowed() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;
    let base = server.url();

    let _metadata = server
        .mock("GET", "/media-2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"url": format!("{}/download/media-2", base)}).to_string())
        .create_async()
        .await;
    let _download = server
        .mock("GET", "/download/media-2")
        .with_status(200)
        .with_body(vec![1, 2, 3])
        .create_async()
        .await;
    let transcription = server
        .mock("POST", "/audio/transcriptions")
        .with_status(500)
        .with_body(r#"{"error":{"message":"boom"}}"#)
        .expect(1)
        .create_async()
        .await;
    let prediction = server
        .mock("POST", "/api/v1/prediction/flow-1")
        .expect(0)
        .create_async()
        .await;

    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars(&server.url()))).await;
    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&audio_webhook("wamid.voice-2", "4412", "media-2"))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "success");
    transcription.assert_async().await;
    prediction.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn media_download_failure_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;

    let _metadata = server
        .mock("GET", "/media-3")
        .with_status(404)
        .with_body(r#"{"error":{"message":"Unsupported get request"}}"#)
        .create_async()
        .await;
    let transcription = server
        .mock("POST", "/audio/transcriptions")
        .expect(0)
        .create_async()
        .await;

    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars(&server.url()))).await;
    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&audio_webhook("wamid.voice-3", "4412", "media-3"))
        .send()
        .await?;

    assert_eq!(response.status(), 500);
    transcription.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn missing_prediction_url_reports_generic_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;
    let outbound = server
        .mock("POST", "/555/messages")
        .expect(0)
        .create_async()
        .await;

    let vars: Vec<_> = mock_upstream_vars(&server.url())
        .into_iter()
        .filter(|(key, _)| *key != "FLOWISE_PREDICTION_URL")
        .collect();
    let gateway = spawn_gateway(config_from_vars(&vars)).await;
    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&text_webhook("wamid.in-9", "4412", "hello"))
        .send()
        .await?;

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "configuration_error");
    assert_eq!(body["message"], "Error querying the API");
    assert_eq!(body["retryable"], false);

    outbound.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn hanging_prediction_is_a_retryable_timeout() -> Result<(), Box<dyn std::error::Error>> {
    let silent = spawn_silent_upstream().await;
    let mut vars = mock_upstream_vars(&silent);
    vars.push(("UPSTREAM_TIMEOUT_SECS", "1".to_string()));
    let gateway = spawn_gateway(config_from_vars(&vars)).await;

    let response = gateway
        .client
        .post(gateway.url("/whatsapp/webhook"))
        .json(&text_webhook("wamid.in-10", "4412", "hello"))
        .send()
        .await?;

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await?;
    assert_eq!(body["error"], "upstream_timeout");
    assert_eq!(body["message"], "Error querying the API");
    assert_eq!(body["retryable"], true);
    Ok(())
}

#[tokio::test]
async fn blank_text_is_processed_without_prediction() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new_async().await;
    let prediction = server
        .mock("POST", "/api/v1/prediction/flow-1")
        .expect(0)
        .create_async()
        .await;
    let outbound = server
        .mock("POST", "/555/messages")
        .expect(0)
        .create_async()
        .await;

    let gateway = spawn_gateway(config_from_vars(&mock_upstream_vars(&server.url()))).await;
    for body in ["", "   "] {
        let response = gateway
            .client
            .post(gateway.url("/whatsapp/webhook"))
            .json(&text_webhook("wamid.in-11", "4412", body))
            .send()
            .await?;
        assert_eq!(response.status(), 200);
        let result: Value = response.json().await?;
        assert_eq!(result["status"], "success");
        assert_eq!(result["processed"], 1);
        assert_eq!(result["ignored"], 0);
    }

    prediction.assert_async().await;
    outbound.assert_async().await;
    Ok(())
}
