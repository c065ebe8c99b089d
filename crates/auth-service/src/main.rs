//! OAuth 2.0 authorization service
//!
//! Provides:
//! - Authorization code flow with a username/password login form
//! - Token exchange, refresh and revocation
//! - Federated sign-in and bearer assertions from an external IdP
//! - Token validation for resource servers

mod config;
mod error;
mod extract;
mod oauth;
mod routes;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use oauth_core::credentials::generate_opaque_token;
use oauth_core::{AuthorizationServer, SystemClock};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, FederatedCallback};

#[derive(Parser, Debug)]
#[command(name = "auth-service")]
#[command(about = "OAuth 2.0 authorization service")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 3001, env = "AUTH_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "AUTH_BIND")]
    bind: String,

    /// Path to config directory
    #[arg(long, default_value = "/config", env = "AUTH_CONFIG_PATH")]
    config_path: String,

    /// Public URL for this service (used as the login form target)
    #[arg(long, env = "AUTH_PUBLIC_URL")]
    public_url: String,

    /// Token signing secret, overrides `token_secret` in config.json
    #[arg(long, env = "AUTH_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,
}

/// Shared application state
pub struct AppState {
    pub server: AuthorizationServer,
    pub public_url: String,
    /// Connected app that IdP callbacks are redeemed as
    pub federated_callback: Option<FederatedCallback>,
}

impl AppState {
    /// Absolute URL the login form posts to
    pub fn authorize_action(&self) -> String {
        format!("{}/authorize", self.public_url.trim_end_matches('/'))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_service=info,oauth_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config_path)?;
    let token_secret = match cli.token_secret.clone().or_else(|| config.token_secret.clone()) {
        Some(secret) => secret,
        None => {
            tracing::warn!("No token secret configured; generated one (tokens won't survive restarts)");
            generate_opaque_token()
        }
    };
    let server = config.build_server(&token_secret, Arc::new(SystemClock))?;
    let federated_callback = config.federated_callback()?;

    let state = Arc::new(AppState {
        server,
        public_url: cli.public_url.clone(),
        federated_callback,
    });
    let app = routes::router(state);

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;

    tracing::info!("Starting auth-service on {}", addr);
    tracing::info!("Public URL: {}", cli.public_url);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Auth service shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
