use intake_module::service::{run_server, IntakeConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();
    dotenvy::dotenv().ok();

    let config = IntakeConfig::from_env()?;
    info!(
        "intake gateway starting: extractor={}, sheet={}, signature check={}",
        config.extractor.kind.as_str(),
        config.sheet_name,
        config.line_channel_secret.is_some()
    );

    run_server(config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
