use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    http::{header::AUTHORIZATION, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use directories::ProjectDirs;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::require_session,
    handlers::{
        create_album, create_purchase, delete_album, get_album, health, list_albums, login,
        logout, replace_album, signup,
    },
    session::{SessionRegistry, TokenFormat},
    store::Store,
    AppState,
};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub cors_origins: Option<String>,
    /// Upper bound on a single store operation ($PLATTER_STORE_TIMEOUT, e.g. `5s`).
    pub store_timeout: Duration,
    /// `secure` (default) or `legacy` ($PLATTER_TOKEN_FORMAT).
    pub token_format: TokenFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("PLATTER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PLATTER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            data_dir: std::env::var("PLATTER_DATA_DIR").ok().map(PathBuf::from),
            cors_origins: std::env::var("PLATTER_CORS_ORIGINS").ok(),
            store_timeout: std::env::var("PLATTER_STORE_TIMEOUT")
                .ok()
                .and_then(|v| humantime::parse_duration(&v).ok())
                .unwrap_or(DEFAULT_STORE_TIMEOUT),
            token_format: std::env::var("PLATTER_TOKEN_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }
}

/// Resolve the data directory, creating it if needed. Without an explicit
/// directory this is the platform app data dir (`~/.local/share/platter/`, etc.).
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let path = match data_dir {
        Some(d) => d.clone(),
        None => platform_data_dir()?,
    };
    std::fs::create_dir_all(&path).context("create data dir")?;
    Ok(path)
}

fn platform_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", "platter")
        .map(|dirs| dirs.data_dir().to_owned())
        .context("could not determine platform data directory")
}

/// Assemble the full router. Album writes and purchases sit behind
/// [`require_session`]; everything else is public.
pub fn app(state: AppState, cors_origins: Option<&str>) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/albums", get(list_albums))
        .route("/albums/{id}", get(get_album))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout));

    let protected = Router::new()
        .route("/albums", post(create_album))
        .route("/albums/{id}", put(replace_album))
        .route("/albums/{id}", delete(delete_album))
        .route("/purchases", post(create_purchase))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let db_path = data_dir.join("platter.db");
    let store = Store::open(&db_path).context("open store")?;

    if cfg.token_format == TokenFormat::Legacy {
        tracing::warn!("legacy session tokens enabled; they are guessable");
    }

    let state = AppState {
        store,
        sessions: SessionRegistry::new(cfg.token_format),
        store_timeout: cfg.store_timeout,
    };

    let router = app(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "platter server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, router).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers([AUTHORIZATION]);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
