use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay::RelayApp;
use chat_relay::cli::Cli;
use chat_relay::config::{RelayConfig, json_logs_requested};
use chat_relay::selection::{JsonFileStore, SelectionStore};
use chat_relay::server::HttpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(json_logs_requested(&cli, |key| std::env::var(key).ok()));

    let config = RelayConfig::from_cli(&cli).context("Invalid configuration")?;

    if cli.should_run() {
        run(config).await
    } else {
        print_config(&config).await
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chat_relay=info,tower_http=info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let (app, events) =
        RelayApp::from_config(&config).context("Failed to set up the WhatsApp session client")?;

    tracing::info!(
        selected_chats = app.selection.len().await,
        slack_webhook_configured = app.selection.has_endpoint().await,
        config_path = %config.config_path.display(),
        "Relay configuration loaded"
    );

    let dispatcher = app.spawn_dispatcher(events);

    let port = app.selection.server_port().await;
    let mut server = HttpServer::new(SocketAddr::from(([0, 0, 0, 0], port)));
    server
        .start(app.router(Some(&config.static_dir)))
        .await
        .context("Failed to start HTTP server")?;

    // Let the HTTP surface come up before launching the browser session.
    tokio::select! {
        _ = tokio::time::sleep(config.startup_delay) => {
            tracing::info!(bridge = %config.bridge_url, "Initializing WhatsApp session");
            app.controller.start().await;
            shutdown_signal().await;
        }
        _ = shutdown_signal() => {}
    }

    tracing::info!("Shutdown signal received");
    server.shutdown().await;
    dispatcher.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn print_config(config: &RelayConfig) -> anyhow::Result<()> {
    let store = Arc::new(JsonFileStore::new(&config.config_path));
    let config_path = store.path().display().to_string();
    let selection = SelectionStore::open(store, &config.env_defaults());

    let report = serde_json::json!({
        "configPath": config_path,
        "serverPort": selection.server_port().await,
        "hasSlackWebhook": selection.has_endpoint().await,
        "selectedChats": selection.all().await,
        "lastUpdated": selection.last_updated().await,
        "bridgeUrl": config.bridge_url,
        "launch": config.launch,
        "maxRetries": config.retry.max_attempts,
        "retryDelaySecs": config.retry.delay.as_secs(),
        "startupDelaySecs": config.startup_delay.as_secs(),
        "staticDir": config.static_dir.display().to_string(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render configuration")?
    );
    Ok(())
}
