//! platform-link-axum - axum handlers for the platform-link connection
//! manager.
//!
//! The embedding application authenticates requests however it likes and
//! inserts an [`AuthUser`] into request extensions (typically from an auth
//! middleware); every route except the provider callback requires it.
//!
//! ```ignore
//! let state = AppState { manager, public_base_url };
//! let app = Router::new()
//!     .nest("/api/oauth", platform_link_axum::router(state))
//!     .layer(middleware::from_fn(my_auth_middleware));
//! ```

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;

use platform_link::ConnectionManager;

mod error;
mod oauth;

pub use error::ApiError;

/// The authenticated dashboard user, inserted into request extensions by
/// the embedding application's auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or((
            StatusCode::UNAUTHORIZED,
            "Authentication required".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    /// Where the browser lands after a completed callback
    /// (`{public_base_url}/?connected={platform}`).
    pub public_base_url: String,
}

/// Build the OAuth route tree. Mount it under `/api/oauth` so the callback
/// path lines up with the redirect URI the registry hands to providers.
pub fn router(state: AppState) -> Router {
    oauth::router(state)
}
