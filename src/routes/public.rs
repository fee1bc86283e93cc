use crate::{AppState, handlers, routes::authenticated};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a bearer credential: health checks and login.
/// Registration is open unless the deployment configures a policy for it.
pub fn public_routes(state: &AppState) -> Router<AppState> {
    let open = Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /health/db
        // Readiness probe: one round-trip to the credential store.
        .route("/health/db", get(handlers::db_health))
        // POST /auth/login
        // Exchanges username/password for a signed token.
        .route("/auth/login", post(handlers::login));

    let register = Router::new().route("/auth/register", post(handlers::register));
    let register = match state.config.policies.registration {
        Some(policy) => authenticated(register, state, policy),
        None => register,
    };

    open.merge(register)
}
