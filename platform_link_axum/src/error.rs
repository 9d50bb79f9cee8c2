use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use platform_link::ConnectError;

/// Response wrapper mapping flow errors onto the HTTP surface.
///
/// Configuration and validation failures are terminal 4xx responses;
/// provider-side failures surface as 502 so the dashboard can distinguish
/// "fix your setup" from "the provider is unhappy"; an unusable connection
/// is 409, which the UI renders as "reconnect required".
pub struct ApiError(pub ConnectError);

impl From<ConnectError> for ApiError {
    fn from(err: ConnectError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0.log();
        let status = match &error {
            ConnectError::UnsupportedPlatform(_)
            | ConnectError::MisconfiguredProvider(_)
            | ConnectError::InvalidCallback(_) => StatusCode::BAD_REQUEST,
            ConnectError::ProviderDenied(_) => StatusCode::FORBIDDEN,
            ConnectError::NotFound(_) => StatusCode::NOT_FOUND,
            ConnectError::NoCredential | ConnectError::Unrecoverable(_) => StatusCode::CONFLICT,
            ConnectError::TokenExchange(_) | ConnectError::RefreshFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            ConnectError::ProfileFetch(_)
            | ConnectError::Cipher(_)
            | ConnectError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": error.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_for(err: ConnectError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_validation_errors_are_bad_request() {
        assert_eq!(
            status_for(ConnectError::UnsupportedPlatform("myspace".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(ConnectError::MisconfiguredProvider("no creds".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(ConnectError::InvalidCallback("missing code".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_provider_failures_are_bad_gateway() {
        assert_eq!(
            status_for(ConnectError::TokenExchange("500".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(ConnectError::RefreshFailed("timeout".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_unusable_connection_is_conflict() {
        assert_eq!(
            status_for(ConnectError::Unrecoverable("reconnect".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(ConnectError::NoCredential), StatusCode::CONFLICT);
    }

    #[test]
    fn test_denied_and_missing() {
        assert_eq!(
            status_for(ConnectError::ProviderDenied("access_denied".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(ConnectError::NotFound("conn-1".into())),
            StatusCode::NOT_FOUND
        );
    }
}
