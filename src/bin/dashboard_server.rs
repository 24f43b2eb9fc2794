use std::sync::Arc;

use pairscan::{
    dashboard_router, init_logging, log_app_bind, log_app_start, log_stream_selected,
    logging_config_from_env, scanner_config_from_env, DashboardControl, DashboardRuntime,
    DashboardSnapshotSource, InMemorySnapshotSource, ReqwestScannerApi, ScannerApi,
    StreamSelection,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let config = scanner_config_from_env();
    config.validate()?;
    log_stream_selected(StreamSelection::for_config(&config));

    // The blocking client owns its own runtime; build it off the async workers.
    let base_url = config.api_base_url.clone();
    let timeout_ms = config.http_timeout_ms;
    let api: Arc<dyn ScannerApi> = Arc::new(
        tokio::task::spawn_blocking(move || ReqwestScannerApi::new(base_url, timeout_ms))
            .await??,
    );

    let publisher = InMemorySnapshotSource::default();
    let (runtime, control) = DashboardRuntime::new(&config, api, publisher.clone());
    let runtime_task = tokio::spawn(runtime.run());

    let source: Arc<dyn DashboardSnapshotSource> = Arc::new(publisher);
    let control: Arc<dyn DashboardControl> = Arc::new(control);
    let app = dashboard_router(source, control);
    let listener = tokio::net::TcpListener::bind(config.dashboard_addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // The router held the last control sender, so the runtime now unwinds.
    runtime_task.await?;
    Ok(())
}
