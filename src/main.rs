//! Edge gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                     EDGE GATEWAY                      │
//!                          │                                                       │
//!   Client Request         │  ┌─────────┐   ┌──────────┐   ┌───────────┐          │
//!   ───────────────────────┼─▶│  http   │──▶│ security │──▶│ security  │          │
//!                          │  │ server  │   │  authn   │   │rate limit │          │
//!                          │  └─────────┘   └──────────┘   └─────┬─────┘          │
//!                          │                                     ▼                 │
//!                          │                               ┌───────────┐          │
//!                          │                               │  routing  │          │
//!                          │                               │ + rewrite │          │
//!                          │                               └─────┬─────┘          │
//!                          │                                     ▼                 │
//!   Client Response        │  ┌──────────┐   ┌──────────┐   ┌───────────┐          │
//!   ◀──────────────────────┼──│ response │◀──│ upstream │◀──│ resilience│◀─────────┼── Backend
//!                          │  │  errors  │   │  client  │   │  breaker  │          │   Service
//!                          │  └──────────┘   └──────────┘   └───────────┘          │
//!                          └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Map;
use tokio::net::TcpListener;
use uuid::Uuid;

use edge_gateway::config::load_config;
use edge_gateway::observability::logging::init_logging;
use edge_gateway::security::TokenService;
use edge_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "Edge gateway: authentication, rate limiting and routing for backend services", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Serve,
    /// Sign a token with the configured secret
    IssueToken {
        /// Subject UUID
        #[arg(long)]
        subject: Uuid,
        /// Role claim, repeatable
        #[arg(long = "role")]
        roles: Vec<String>,
        /// Issue a refresh token instead of an access token
        #[arg(long)]
        refresh: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::IssueToken {
            subject,
            roles,
            refresh,
        } => {
            let tokens = TokenService::new(&config.auth)?;
            let token = if refresh {
                tokens.issue_refresh_token(subject, tokens.refresh_ttl())?
            } else {
                tokens.issue_access_token(subject, &roles, Map::new(), tokens.access_ttl())?
            };
            println!("{token}");
            Ok(())
        }
    }
}

async fn serve(config: edge_gateway::GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        services = config.services.len(),
        upstream_timeout_ms = config.timeouts.upstream_ms,
        "Configuration loaded"
    );

    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
