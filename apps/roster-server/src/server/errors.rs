use axum::{http::StatusCode, response::IntoResponse, Json};

use super::{metrics::record_auth_failure, types::ErrorBody};

/// Handshake rejection taxonomy. Every variant refuses the connection before
/// any registry entry exists; none of them is retried by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthError {
    MissingCredential,
    InvalidCredential,
    UnknownUser,
    InactiveUser,
}

impl AuthError {
    pub(crate) fn reason(self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential => "invalid_credential",
            Self::UnknownUser => "unknown_user",
            Self::InactiveUser => "inactive_user",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        record_auth_failure(self.reason());

        let status = match self {
            Self::MissingCredential | Self::InvalidCredential | Self::UnknownUser => {
                StatusCode::UNAUTHORIZED
            }
            Self::InactiveUser => StatusCode::FORBIDDEN,
        };
        (
            status,
            Json(ErrorBody {
                error: self.reason(),
            }),
        )
            .into_response()
    }
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(true)
        .init();
}
