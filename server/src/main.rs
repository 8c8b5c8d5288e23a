use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};
use server::{build_app, ServerConfig};
use tokio::net::TcpListener;

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Synonym table (JSON object: term -> alternates)
    #[arg(long)]
    synonyms: Option<PathBuf>,
    /// Ranking weights override (JSON)
    #[arg(long)]
    weights: Option<PathBuf>,
    /// Per-request ranking budget in milliseconds (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    query_budget_ms: u64,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = ServerConfig {
        index: args.index,
        synonyms: args.synonyms,
        weights: args.weights,
        query_budget: (args.query_budget_ms > 0).then(|| Duration::from_millis(args.query_budget_ms)),
    };
    let app: Router = build_app(&config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
