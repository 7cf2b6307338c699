use relay_module::service::BoxError;
use relay_module::{run_server, RelayConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from_env()?;
    info!(
        "relay gateway config host={}, port={}, flowise={}, drive_callback={}, supabase={}",
        config.host,
        config.port,
        config.flowise.prediction_url.is_some(),
        config.drive.callback_url.is_some(),
        config.supabase.url.is_some()
    );

    run_server(config, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
}
