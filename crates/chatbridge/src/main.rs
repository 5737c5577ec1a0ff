use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chatbridge::config::Config;
use chatbridge::dispatch::Dispatcher;
use chatbridge::group::GroupResolver;
use chatbridge::provider::{SessionProvider, SubprocessProvider};
use chatbridge::relay::InboundRelay;
use chatbridge::server::{AppState, build_app};
use chatbridge::session::SessionManager;

#[derive(Parser)]
#[command(name = "chatbridge", version, about = "HTTP gateway for a chat-network account")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "chatbridge.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    tokio::fs::create_dir_all(&config.session.data_dir)
        .await
        .with_context(|| {
            format!(
                "creating session data dir {}",
                config.session.data_dir.display()
            )
        })?;

    let (provider, events) = SubprocessProvider::new(config.subprocess_config());
    let provider: Arc<dyn SessionProvider> = Arc::new(provider);

    let relay = InboundRelay::new(config.relay_config()?).context("building inbound relay")?;
    let (manager, session) =
        SessionManager::new(provider.clone(), events, relay, config.reconnect_policy());

    let cancel = CancellationToken::new();
    let manager_task = tokio::spawn(manager.run(cancel.clone()));

    let state = AppState {
        dispatcher: Arc::new(Dispatcher::new(provider.clone(), session.clone())),
        groups: Arc::new(GroupResolver::new(provider.clone(), session.clone())),
        session,
    };
    let app = build_app(state, config.server.request_timeout_seconds);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "chatbridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    info!("Shutting down");
    cancel.cancel();
    if let Err(e) = manager_task.await {
        warn!(error = %e, "Session manager task failed");
    }
    provider.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
