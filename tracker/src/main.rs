use anyhow::{ensure, Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use maze_node::tracker::{RegisterRequest, UpdateServersRequest};
use maze_node::{TrackerBook, TrackerSnapshot};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Bootstrap directory for the maze game
#[derive(Debug, Parser)]
#[command(name = "tracker", version)]
struct Args {
    /// Port to listen on
    port: u16,

    /// Board side length
    n: usize,

    /// Number of treasures on the board
    k: usize,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone)]
struct AppState {
    book: Arc<RwLock<TrackerBook>>,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/register", post(register))
        .route("/update_servers", post(update_servers))
        .route("/state", get(tracker_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    ensure!(args.n > 0, "N must be at least 1");

    let state = AppState {
        book: Arc::new(RwLock::new(TrackerBook::new(args.n, args.k))),
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, n = args.n, k = args.k, "Tracker listening");

    axum::serve(listener, app(state))
        .await
        .context("Tracker server failed")
}

async fn health_check() -> &'static str {
    "Tracker is alive"
}

async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> Json<TrackerSnapshot> {
    let snapshot = state.book.write().await.register(&req.player);
    Json(snapshot)
}

async fn update_servers(State(state): State<AppState>, Json(req): Json<UpdateServersRequest>) -> impl IntoResponse {
    state.book.write().await.update_servers(req.primary, req.backup);
    StatusCode::OK
}

async fn tracker_state(State(state): State<AppState>) -> Json<TrackerSnapshot> {
    Json(state.book.read().await.snapshot())
}
