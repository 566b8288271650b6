//! Identity resolution middleware.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;

use super::claims::Claims;
use super::error::AuthError;
use crate::api::error::ApiError;
use crate::chat::models::Identity;

/// Header carrying the anonymous device key.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Shared JWT validation state.
#[derive(Clone)]
pub struct AuthState {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthState {
    /// Validation state for HS256 tokens signed with `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    fn decode_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(err.to_string()),
            })
    }
}

fn device_key(headers: &HeaderMap) -> Option<Result<String, AuthError>> {
    let value = headers.get(DEVICE_ID_HEADER)?;
    let Ok(key) = value.to_str() else {
        return Some(Err(AuthError::InvalidDeviceKey));
    };
    let key = key.trim();
    if key.is_empty() || key.len() > 128 || !key.chars().all(|c| c.is_ascii_graphic()) {
        return Some(Err(AuthError::InvalidDeviceKey));
    }
    Some(Ok(key.to_string()))
}

/// Resolve the caller's identity from request headers.
///
/// A bearer token wins over a device key; privileged operations always key
/// off the token's resolved subject, never the raw token value.
pub fn resolve_identity(auth: &AuthState, headers: &HeaderMap) -> Result<Identity, AuthError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;
        let claims = auth.decode_token(token)?;
        return Ok(Identity::Authenticated { user_id: claims.sub });
    }

    match device_key(headers) {
        Some(Ok(device)) => Ok(Identity::Anonymous { device }),
        Some(Err(err)) => Err(err),
        None => Err(AuthError::MissingIdentity),
    }
}

/// Middleware that attaches the resolved [`Identity`] to the request.
pub async fn identity_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = resolve_identity(&auth, request.headers())?;
    debug!(authenticated = identity.is_authenticated(), "resolved identity");
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Extractor for the identity attached by [`identity_middleware`].
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("request identity not resolved"))
    }
}
