/// Router Module Index
///
/// Groups routes by resource. Every protected group is wrapped with exactly one
/// `AuthPolicy` (from `RoutePolicies`) when the router is built, and role-gated
/// groups get the `RoleGate` layer inside the authentication layer.
use axum::{Router, middleware};

use crate::{
    AppState,
    auth::{AuthGuard, AuthPolicy, RoleGate, require_auth, require_role},
};

/// Health checks, login and registration.
pub mod public;

/// Posts and their comments.
pub mod posts;

/// Student and teacher management (teacher-only).
pub mod members;

/// Wraps every route of `router` with the authentication layer for `policy`.
pub(crate) fn authenticated(
    router: Router<AppState>,
    state: &AppState,
    policy: AuthPolicy,
) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        AuthGuard {
            authenticator: state.authenticator.clone(),
            policy,
        },
        require_auth,
    ))
}

/// Authentication followed by a role check. `route_layer` wraps outside-in, so the
/// role gate is added first and the authentication layer ends up outermost.
pub(crate) fn role_gated(
    router: Router<AppState>,
    state: &AppState,
    policy: AuthPolicy,
    gate: RoleGate,
) -> Router<AppState> {
    let gated = router.route_layer(middleware::from_fn_with_state(gate, require_role));
    authenticated(gated, state, policy)
}
