pub mod auth;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod server;
pub mod session;
pub mod store;

use std::time::Duration;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    /// Live session tokens. Owned by the server, not a global.
    pub sessions: session::SessionRegistry,
    /// Upper bound on a single store operation.
    pub store_timeout: Duration,
}

pub use error::ApiError;
pub use server::{app, resolve_data_dir, run, ServerConfig};
