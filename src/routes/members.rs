use crate::{
    AppState,
    auth::RoleGate,
    handlers,
    models::Role,
    routes::role_gated,
};
use axum::{
    Router,
    routing::get,
};

/// Members Router Module
///
/// Student and teacher management. Every route requires a teacher identity; callers
/// holding the shared server secret pass the gate when the configured policy admits
/// them at all.
pub fn member_routes(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        // GET/POST /students
        .route(
            "/students",
            get(handlers::list_students).post(handlers::create_student),
        )
        // GET/PUT /students/{id}
        .route(
            "/students/{id}",
            get(handlers::get_student).put(handlers::update_student),
        )
        // GET/POST /teachers
        .route(
            "/teachers",
            get(handlers::list_teachers).post(handlers::create_teacher),
        )
        // GET/PUT /teachers/{id}
        .route(
            "/teachers/{id}",
            get(handlers::get_teacher).put(handlers::update_teacher),
        );

    role_gated(
        routes,
        state,
        state.config.policies.members,
        RoleGate::new(Role::Teacher).allowing_system(),
    )
}
