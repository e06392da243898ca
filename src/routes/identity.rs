use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

/// Header carrying the caller identity issued by the external auth service.
pub const IDENTITY_HEADER: &str = "x-identity-id";

/// Authenticated caller. Rejects requests without a valid identity header.
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity(pub Uuid);

/// Caller identity when present; guests send none.
#[derive(Debug, Clone, Copy)]
pub struct OptionalCallerIdentity(pub Option<Uuid>);

fn read_identity(parts: &Parts) -> Result<Option<Uuid>, AppError> {
    let Some(value) = parts.headers.get(IDENTITY_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized(format!("malformed `{IDENTITY_HEADER}` header")))
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        read_identity(parts)?
            .map(CallerIdentity)
            .ok_or_else(|| AppError::Unauthorized(format!("missing `{IDENTITY_HEADER}` header")))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for OptionalCallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        read_identity(parts).map(OptionalCallerIdentity)
    }
}
