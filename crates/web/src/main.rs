use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use forge_dispatch_agent::agent_from_config;
use forge_dispatch_core::config::Config;
use forge_dispatch_github::GitHub;
use forge_dispatch_web::{app, registry::LabelHandlers, AppState};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yml".to_string());
    let config = Arc::new(Config::load(&config_path).expect("Failed to load config"));
    let github =
        Arc::new(GitHub::new(&config.github_app).expect("Failed to create GitHub App client"));
    let agent = agent_from_config(&config.agent).expect("Failed to create agent");
    let handlers = Arc::new(LabelHandlers::defaults());
    tracing::info!(
        app = %github.app_name,
        handlers = handlers.len(),
        "starting webhook dispatch service"
    );

    let port = config.server.port;
    let state = AppState { config, github, agent, handlers };
    let router = app(state);

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await.expect("bind error");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    tracing::info!("Shut down gracefully");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        tokio::select! {
            result = signal::ctrl_c() => result.expect("Failed to listen for ctrl-c"),
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for ctrl-c");
    }
}
