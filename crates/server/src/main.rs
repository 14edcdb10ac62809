//! dialflow-server binary

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dialflow_server::{router, AppState, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "dialflow-server", about = "Outbound voice campaign engine", version)]
struct Args {
    /// Address to bind the HTTP/WebSocket listener to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind_addr: SocketAddr,

    /// SQLite connection string
    #[arg(long, env = "DIALFLOW_DATABASE_URL", default_value = "sqlite:dialflow.db")]
    database_url: String,

    /// Publicly reachable base URL (webhooks and media stream derive from it)
    #[arg(long, env = "PUBLIC_BASE_URL")]
    public_base_url: String,

    /// Carrier account sid
    #[arg(long, env = "CARRIER_ACCOUNT_SID")]
    carrier_account_sid: String,

    /// Carrier auth token
    #[arg(long, env = "CARRIER_AUTH_TOKEN")]
    carrier_auth_token: String,

    /// Conversational-AI provider API key
    #[arg(long, env = "AGENT_API_KEY")]
    agent_api_key: String,

    /// Conversational-AI agent id
    #[arg(long, env = "AGENT_ID")]
    agent_id: String,

    /// Shared secret for agent webhook signatures
    #[arg(long, env = "AGENT_WEBHOOK_SECRET")]
    agent_webhook_secret: String,

    /// Default caller id for requests that do not carry one
    #[arg(long, env = "DEFAULT_CALLER_ID", default_value = "")]
    default_caller_id: String,

    /// Optional carrier region hint
    #[arg(long, env = "CARRIER_REGION")]
    region: Option<String>,

    /// Directory for cached recording files
    #[arg(long, env = "RECORDINGS_DIR")]
    recordings_dir: Option<PathBuf>,

    /// Log filter (overrides RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 Starting dialflow-server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig {
        bind_addr: args.bind_addr,
        database_url: args.database_url,
        public_base_url: args.public_base_url,
        carrier_account_sid: args.carrier_account_sid,
        carrier_auth_token: args.carrier_auth_token,
        agent_api_key: args.agent_api_key,
        agent_id: args.agent_id,
        agent_webhook_secret: args.agent_webhook_secret,
        default_caller_id: args.default_caller_id,
        region: args.region,
        recordings_dir: args
            .recordings_dir
            .unwrap_or_else(|| std::env::temp_dir().join("dialflow-recordings")),
    };

    let state = AppState::from_config(config.clone())
        .await
        .context("failed to assemble server state")?;
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("✅ Listening on {}", config.bind_addr);
    info!("📞 Media stream endpoint: {}", config.media_stream_url());
    info!("📬 Carrier webhook: {}", config.carrier_webhook_url());

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received");
            shutdown_state.shutdown().await;
        })
        .await
        .context("server error")?;

    Ok(())
}
