use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use pasetors::{
    claims::{Claims, ClaimsValidationRules},
    local,
    token::UntrustedToken,
    version4::V4,
    Local,
};
use roster_core::UserId;
use roster_protocol::{Envelope, EventType, PROTOCOL_VERSION};
use serde::Serialize;

use super::{
    core::{AppState, Identity},
    errors::AuthError,
};

/// Turn an inbound connection attempt into a resolved identity.
///
/// Suspends only on collaborator lookups, strictly before any registry
/// interaction; a handshake that fails here leaves no state behind.
pub(crate) async fn authenticate(
    state: &AppState,
    raw_credential: Option<&str>,
) -> Result<Identity, AuthError> {
    let token = raw_credential
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingCredential)?;

    let claims = verify_access_token(state, token).map_err(|_| AuthError::InvalidCredential)?;
    let subject = claims
        .get_claim("sub")
        .and_then(serde_json::Value::as_str)
        .ok_or(AuthError::InvalidCredential)?;
    let user_id =
        UserId::try_from(subject.to_owned()).map_err(|_| AuthError::InvalidCredential)?;

    let account = state
        .directory
        .lookup(user_id)
        .await
        .ok_or(AuthError::UnknownUser)?;
    if !account.active {
        return Err(AuthError::InactiveUser);
    }

    Ok(Identity {
        user_id,
        display_name: account.display_name,
    })
}

pub(crate) fn verify_access_token(state: &AppState, token: &str) -> anyhow::Result<Claims> {
    let untrusted = UntrustedToken::<Local, V4>::try_from(token).map_err(|e| anyhow!("{e}"))?;
    let validation_rules = ClaimsValidationRules::new();
    let trusted = local::decrypt(&state.token_key, &untrusted, &validation_rules, None, None)
        .map_err(|e| anyhow!("token decrypt failed: {e}"))?;
    trusted
        .payload_claims()
        .cloned()
        .ok_or_else(|| anyhow!("token claims missing"))
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    header.strip_prefix("Bearer ")
}

pub(crate) fn now_unix() -> i64 {
    let now = SystemTime::now();
    let seconds = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs();
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

pub(crate) fn outbound_event<T: Serialize>(event_type: &str, data: T) -> String {
    let envelope = Envelope {
        v: PROTOCOL_VERSION,
        t: EventType::try_from(event_type.to_owned()).unwrap_or_else(|_| {
            EventType::try_from(String::from("ready")).expect("valid event type")
        }),
        d: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
    };

    serde_json::to_string(&envelope)
        .unwrap_or_else(|_| String::from(r#"{"v":1,"t":"ready","d":{}}"#))
}
