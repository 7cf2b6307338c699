use axum::http::HeaderMap;

/// Verify WhatsApp webhook subscription request.
/// Returns the challenge token if verification succeeds.
pub(super) fn verify_whatsapp_subscription(
    expected_token: Option<&str>,
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
) -> Result<String, &'static str> {
    let Some(expected) = expected_token.filter(|value| !value.trim().is_empty()) else {
        return Err("verify_token_not_configured");
    };

    if mode != Some("subscribe") {
        return Err("invalid_mode");
    }

    let provided_token = token.filter(|value| !value.is_empty()).ok_or("missing_token")?;
    if provided_token != expected {
        return Err("token_mismatch");
    }

    challenge.map(|c| c.to_string()).ok_or("missing_challenge")
}

/// Check the `X-Goog-Channel-Token` of a Drive notification.
/// Channels are only checked when a token is configured.
pub(super) fn verify_drive_channel(
    headers: &HeaderMap,
    expected_token: Option<&str>,
) -> Result<(), &'static str> {
    let Some(expected) = expected_token.filter(|value| !value.trim().is_empty()) else {
        return Ok(());
    };
    let header = headers
        .get("x-goog-channel-token")
        .and_then(|value| value.to_str().ok())
        .ok_or("missing_token")?;
    if header != expected {
        return Err("invalid_token");
    }
    Ok(())
}
