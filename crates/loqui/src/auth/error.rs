//! Authentication errors.

use thiserror::Error;

/// Errors resolving a request's identity.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Neither a bearer token nor a device key was presented.
    #[error("missing credentials: provide a bearer token or a device id")]
    MissingIdentity,

    /// Authorization header present but not `Bearer <token>`.
    #[error("invalid authorization header")]
    InvalidAuthHeader,

    /// Token failed validation.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token expired.
    #[error("token has expired")]
    TokenExpired,

    /// Device key header is malformed.
    #[error("invalid device id")]
    InvalidDeviceKey,
}
