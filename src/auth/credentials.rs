//! Registration and login: the bridge between raw user input, the credential store
//! and the token codec.

use super::{Authenticator, password};
use crate::{
    error::{ApiError, ApiResult},
    models::{
        CreateMemberRequest, LoginRequest, LoginResponse, NewUser, RegisterRequest, Role,
        UserProfile, non_blank,
    },
    repository::Repository,
};

/// Validated input for creating a credential.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub role: Role,
}

impl NewCredential {
    /// Validates a self-registration payload. The role defaults to `student`.
    pub fn from_registration(req: RegisterRequest) -> ApiResult<Self> {
        let (username, password) = required_pair(req.username, req.password)?;

        let role = match non_blank(req.role) {
            None => Role::Student,
            Some(raw) => raw
                .parse::<Role>()
                .ok()
                .filter(Role::is_assignable)
                .ok_or_else(|| ApiError::validation("Invalid user type"))?,
        };

        Ok(Self {
            username,
            password,
            name: non_blank(req.name),
            role,
        })
    }

    /// Validates a teacher-issued member payload. `role` comes from the route.
    pub fn from_member(req: CreateMemberRequest, role: Role) -> ApiResult<Self> {
        let name = non_blank(req.name);
        let username = non_blank(req.username);
        let password = req.password.filter(|p| !p.is_empty());

        match (name, username, password) {
            (Some(name), Some(username), Some(password)) => Ok(Self {
                username,
                password,
                name: Some(name),
                role,
            }),
            _ => Err(ApiError::validation(
                "name, username and password are required",
            )),
        }
    }
}

fn required_pair(
    username: Option<String>,
    password: Option<String>,
) -> ApiResult<(String, String)> {
    let username = non_blank(username);
    let password = password.filter(|p| !p.is_empty());
    match (username, password) {
        (Some(u), Some(p)) => Ok((u, p)),
        _ => Err(ApiError::validation("Username and password are required")),
    }
}

/// register
///
/// Creates a credential unless the username is taken. The existence check gives the
/// common case a clean error; the store's unique constraint settles concurrent
/// registrations (surfacing as `StoreError::Duplicate`).
pub async fn register(repo: &dyn Repository, credential: NewCredential) -> ApiResult<UserProfile> {
    if repo
        .find_user_by_username(&credential.username)
        .await?
        .is_some()
    {
        tracing::debug!(username = %credential.username, "registration rejected: duplicate username");
        return Err(ApiError::DuplicateUsername);
    }

    let password_hash = password::hash_password_async(credential.password).await?;
    let user = repo
        .create_user(NewUser {
            username: credential.username,
            password_hash,
            name: credential.name,
            role: credential.role,
        })
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "user registered");
    Ok(user.into())
}

/// login
///
/// Verifies a username/password pair and issues a signed token. Unknown usernames and
/// wrong passwords fail with the same error after the same amount of hashing work.
pub async fn login(
    repo: &dyn Repository,
    authenticator: &Authenticator,
    req: LoginRequest,
) -> ApiResult<LoginResponse> {
    let (username, candidate) = required_pair(req.username, req.password)?;

    let Some(user) = repo.find_user_by_username(&username).await? else {
        password::verify_dummy(candidate).await;
        tracing::warn!(%username, "login attempt for unknown user");
        return Err(ApiError::InvalidCredentials);
    };

    if !password::verify_password_async(candidate, user.password_hash.clone()).await? {
        tracing::warn!(user_id = %user.id, "login attempt with incorrect password");
        return Err(ApiError::InvalidCredentials);
    }

    let codec = authenticator.tokens();
    let token = codec
        .issue(user.id, user.role)
        .map_err(|e| ApiError::internal(format!("failed to sign token: {e}")))?;

    tracing::info!(user_id = %user.id, "login succeeded");
    Ok(LoginResponse {
        token,
        username: user.username,
        role: user.role,
        expires_in: codec.ttl().as_secs(),
    })
}
