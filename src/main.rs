use std::error::Error;

use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use boards_realtime::application::StandaloneRuntime;
use boards_realtime::config::{AppConfig, LogFormat, RealtimeMode, ServerConfig};

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.as_str()));

    match server.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init(),
    }
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    let _ = shutdown.send(true);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    if config.realtime.mode == RealtimeMode::Plugin {
        tracing::error!("Plugin mode is started by the embedding host through PluginRuntime");
        return Err("plugin mode is not supported by the standalone binary".into());
    }

    let AppConfig {
        server,
        realtime,
        database,
        ..
    } = config;

    let runtime = StandaloneRuntime::connect(&realtime, database.as_ref()).await?;
    let app = runtime.router().layer(TraceLayer::new_for_http());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = runtime.into_reaper();
    let reaper_task = tokio::spawn(async move { reaper.run(shutdown_rx).await });

    let addr = server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?server.environment, "Realtime server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    let _ = reaper_task.await;
    tracing::info!("Realtime server stopped");
    Ok(())
}
