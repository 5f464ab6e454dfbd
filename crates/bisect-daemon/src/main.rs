#![deny(unsafe_code)]
use anyhow::{Context, Result};
use axum::middleware as axum_middleware;
use bisect_daemon::middleware::{CorsConfig, RequestLogger, request_id_middleware};
use bisect_daemon::{AppState, build_app};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bisect-daemon", version, about = "bisect job broker daemon")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8088")]
    bind: String,

    /// Enable verbose request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("bisect=debug,bisect_daemon=debug,bisect_core=debug")
    } else {
        EnvFilter::new("bisect=info,bisect_daemon=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = Arc::new(AppState::new());

    let cors = CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allowed_methods: vec![
            "GET".to_string(),
            "POST".to_string(),
            "PATCH".to_string(),
            "PUT".to_string(),
        ],
        allowed_headers: vec!["content-type".to_string(), "if-match".to_string()],
    };

    let app = build_app(state)
        .layer(axum_middleware::from_fn(RequestLogger::layer))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(cors.to_cors_layer());

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, "bisect-daemon listening");

    axum::serve(listener, app).await.context("serve")
}
