use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{error::ApiError, models::Role};

pub mod authorizer;
pub mod credentials;
pub mod password;
pub mod token;

pub use authorizer::{RoleGate, require_role};
pub use token::{Claims, TokenCodec, TokenError};

const BEARER_PREFIX: &str = "Bearer ";

/// AuthPolicy
///
/// Which bearer credentials a protected route group accepts. Chosen once when the
/// router is built, never inferred from the credential that happens to arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Per-user signed token only.
    TokenOnly,
    /// The static server secret only.
    SharedSecretOnly,
    /// Server secret first, then a signed token.
    EitherTokenOrSharedSecret,
}

impl FromStr for AuthPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(AuthPolicy::TokenOnly),
            "secret" => Ok(AuthPolicy::SharedSecretOnly),
            "either" => Ok(AuthPolicy::EitherTokenOrSharedSecret),
            other => Err(format!(
                "unknown auth policy '{other}' (expected token, secret or either)"
            )),
        }
    }
}

impl fmt::Display for AuthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthPolicy::TokenOnly => "token",
            AuthPolicy::SharedSecretOnly => "secret",
            AuthPolicy::EitherTokenOrSharedSecret => "either",
        })
    }
}

/// Identity
///
/// The resolved caller of an authenticated request. Attached to the request
/// extensions by `require_auth` and pulled out by handlers as an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The user id from the token. `None` for shared-secret callers.
    pub subject: Option<Uuid>,
    pub role: Role,
    /// True when the caller presented the shared server secret.
    pub is_system: bool,
}

impl Identity {
    pub fn user(subject: Uuid, role: Role) -> Self {
        Self {
            subject: Some(subject),
            role,
            is_system: false,
        }
    }

    pub fn system() -> Self {
        Self {
            subject: None,
            role: Role::System,
            is_system: true,
        }
    }
}

/// Authenticator
///
/// Validates bearer credentials against an `AuthPolicy`. Holds the signing key and the
/// shared secret, both fixed at construction.
pub struct Authenticator {
    tokens: TokenCodec,
    server_secret: Vec<u8>,
}

impl Authenticator {
    pub fn new(jwt_secret: &str, server_secret: &str, token_ttl: Duration) -> Self {
        Self {
            tokens: TokenCodec::new(jwt_secret, token_ttl),
            server_secret: server_secret.as_bytes().to_vec(),
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Resolves the raw `Authorization` header into an `Identity`.
    pub fn authenticate(
        &self,
        header: Option<&HeaderValue>,
        policy: AuthPolicy,
    ) -> Result<Identity, ApiError> {
        let credential = bearer_credential(header)?;

        match policy {
            AuthPolicy::TokenOnly => self.verify_token(credential),
            AuthPolicy::SharedSecretOnly => {
                if self.is_server_secret(credential) {
                    Ok(Identity::system())
                } else {
                    Err(ApiError::InvalidCredential)
                }
            }
            AuthPolicy::EitherTokenOrSharedSecret => {
                if self.is_server_secret(credential) {
                    Ok(Identity::system())
                } else {
                    self.verify_token(credential)
                }
            }
        }
    }

    fn is_server_secret(&self, credential: &str) -> bool {
        credential.as_bytes() == self.server_secret.as_slice()
    }

    fn verify_token(&self, credential: &str) -> Result<Identity, ApiError> {
        let claims = self.tokens.verify(credential).map_err(|e| match e {
            TokenError::Expired => ApiError::CredentialExpired,
            TokenError::Invalid => ApiError::InvalidCredential,
        })?;

        // Only the server secret may act as the system caller.
        if !claims.role.is_assignable() {
            return Err(ApiError::InvalidCredential);
        }

        Ok(Identity::user(claims.sub, claims.role))
    }
}

/// Extracts `<credential>` from `Bearer <credential>`.
fn bearer_credential(header: Option<&HeaderValue>) -> Result<&str, ApiError> {
    let value = header
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::MissingCredential)?;

    let credential = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(ApiError::MissingCredential)?;

    if credential.is_empty() {
        return Err(ApiError::MissingCredential);
    }
    Ok(credential)
}

/// AuthGuard
///
/// State of one `require_auth` layer: the shared authenticator plus the policy of the
/// route group it wraps.
#[derive(Clone)]
pub struct AuthGuard {
    pub authenticator: Arc<Authenticator>,
    pub policy: AuthPolicy,
}

/// require_auth
///
/// Authentication middleware. On success the `Identity` is inserted into the request
/// extensions; on failure the error response is returned and the handler never runs.
pub async fn require_auth(
    State(guard): State<AuthGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = guard
        .authenticator
        .authenticate(request.headers().get(header::AUTHORIZATION), guard.policy)
        .inspect_err(|e| {
            tracing::debug!(
                policy = %guard.policy,
                reason = e.code(),
                uri = %request.uri(),
                "authentication rejected"
            );
        })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Identity Extractor
///
/// Reads the identity attached by `require_auth`. On a route without the
/// authentication layer this rejects with 401 instead of running unauthenticated.
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
            .ok_or(ApiError::MissingCredential)
    }
}
