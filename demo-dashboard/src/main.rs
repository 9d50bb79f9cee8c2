//! Minimal dashboard backend wiring the connection manager to axum with a
//! SQLite store and a stub auth middleware.
//!
//! Required environment (see platform-link's `ConnectConfig`):
//! `ENCRYPTION_KEY` (64 hex chars), `SESSION_SECRET`, `CLIENT_URL`, and the
//! per-platform `*_CLIENT_ID`/`*_CLIENT_SECRET` pairs you intend to use.

use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use platform_link::{ConnectConfig, ConnectionManager, ConnectionStore, SqliteConnectionStore};
use platform_link_axum::{AppState, AuthUser};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConnectConfig::from_env()?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    let store = Arc::new(SqliteConnectionStore::new(pool));
    store.init().await?;

    let public_base_url = config.public_base_url.clone();
    let manager = Arc::new(ConnectionManager::from_config(&config, store)?);

    let app = Router::new()
        .nest(
            "/api/oauth",
            platform_link_axum::router(AppState {
                manager,
                public_base_url,
            }),
        )
        .layer(middleware::from_fn(demo_auth));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("demo dashboard listening on port {port}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Stand-in for a real session layer: every request is attributed to one
/// demo user. Replace with your authentication middleware in production.
async fn demo_auth(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(AuthUser {
        user_id: "demo-user".to_string(),
    });
    next.run(request).await
}
