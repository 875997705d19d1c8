use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use sheets_module::google_auth::GoogleAuth;
use sheets_module::sheets::{SheetsClient, TokenSource};
use tokio::task;
use tracing::{error, info};

use crate::directory::Directory;
use crate::line::LineProfileClient;
use crate::pipeline::{ReportDate, ReportPipeline};
use crate::router::EventRouter;
use crate::store::SheetLayout;
use crate::worker::spawn_batch_worker;

use super::config::{load_directory, IntakeConfig};
use super::handlers::{health, ingest_line, liveness};
use super::state::IntakeState;
use super::BoxError;

/// Wire up the production pipeline. Builds blocking HTTP clients, so it must
/// run outside the async runtime.
pub fn build_pipeline(config: &IntakeConfig, directory: &Directory) -> Result<ReportPipeline, BoxError> {
    let extractor = config.extractor.build(directory.classifier())?;
    info!("using {} extractor", extractor.name());

    let auth = GoogleAuth::new(config.google_auth.clone())?;
    let sheets = SheetsClient::with_base_url(
        config.spreadsheet_id.clone(),
        TokenSource::Google(auth),
        config.sheets_api_base.clone(),
    )?;
    let identities =
        LineProfileClient::with_base_url(config.line_access_token.clone(), config.line_api_base.clone());
    let date = ReportDate::utc_offset_hours(config.utc_offset_hours)
        .ok_or_else(|| format!("invalid UTC offset: {}", config.utc_offset_hours))?;

    Ok(ReportPipeline::new(
        Arc::new(identities),
        directory.resolver(),
        EventRouter::new(extractor, directory.pricing_officer().map(str::to_string)),
        Arc::new(sheets),
        SheetLayout::new(&config.sheet_name),
        date,
    ))
}

pub fn build_router(state: IntakeState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health))
        .route("/webhook", post(ingest_line))
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

pub async fn run_server(
    config: IntakeConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let directory = load_directory(config.directory_path.as_deref())?;

    let worker_config = config.clone();
    let (queue, worker) = task::spawn_blocking(move || -> Result<_, BoxError> {
        let pipeline = build_pipeline(&worker_config, &directory)?;
        Ok(spawn_batch_worker(pipeline))
    })
    .await
    .map_err(|err| -> BoxError { err.into() })??;

    if config.line_channel_secret.is_none() {
        info!("LINE_CHANNEL_SECRET not set; webhook signatures are not checked");
    }
    let state = IntakeState {
        queue,
        channel_secret: config.line_channel_secret.clone(),
    };
    let app = build_router(state, config.max_body_bytes);

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!(
        "intake gateway listening on {} (sheet {})",
        addr, config.sheet_name
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    // The router held the last queue handle; the worker drains and exits.
    match task::spawn_blocking(move || worker.join()).await {
        Ok(Ok(totals)) => info!("batch worker drained: {:?}", totals),
        Ok(Err(err)) => error!("batch worker ended abnormally: {}", err),
        Err(err) => error!("failed to join batch worker: {}", err),
    }
    serve_result?;
    Ok(())
}
