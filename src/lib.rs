use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
};
use std::sync::Arc;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;

// Routers grouped by resource, each carrying its configured auth policy.
pub mod routes;
use routes::{members, posts, public};

// --- Public Re-exports ---

pub use auth::{AuthPolicy, Authenticator, Identity};
pub use config::AppConfig;
pub use error::ApiError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every handler and schema, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::db_health, handlers::register, handlers::login,
        handlers::list_posts, handlers::search_posts, handlers::get_post,
        handlers::create_post, handlers::update_post, handlers::delete_post,
        handlers::list_comments, handlers::add_comment,
        handlers::list_students, handlers::get_student, handlers::create_student,
        handlers::update_student, handlers::list_teachers, handlers::get_teacher,
        handlers::create_teacher, handlers::update_teacher
    ),
    components(
        schemas(
            models::Role, models::UserProfile, models::Post, models::Comment,
            models::RegisterRequest, models::LoginRequest, models::CreatePostRequest,
            models::UpdatePostRequest, models::CreateCommentRequest, models::CreateMemberRequest,
            models::UpdateMemberRequest, models::RegisterResponse, models::LoginResponse,
            models::StudentResponse, models::TeacherResponse, models::MessageResponse,
            error::ErrorBody,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "campus-blog", description = "Blog and course management API")
    )
)]
pub struct ApiDoc;

/// Registers the `bearerAuth` scheme: either a signed user token or the server secret.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT or server secret")
                    .build(),
            ),
        );
    }
}

/// AppState
///
/// The single shared container handed to every handler: the store, the loaded
/// configuration and the authenticator built from it.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Configuration: loaded once, immutable.
    pub config: AppConfig,
    /// Authenticator holding the signing key and the shared secret.
    pub authenticator: Arc<Authenticator>,
}

impl AppState {
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let authenticator = Arc::new(Authenticator::new(
            &config.jwt_secret,
            &config.server_secret,
            config.token_ttl(),
        ));
        Self {
            repo,
            config,
            authenticator,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for Arc<Authenticator> {
    fn from_ref(app_state: &AppState) -> Arc<Authenticator> {
        app_state.authenticator.clone()
    }
}

/// create_router
///
/// Assembles all route groups with their auth layers, then the observability and
/// CORS layers, and binds the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes(&state))
        .merge(posts::post_routes(&state))
        .merge(members::member_routes(&state))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, correlated by its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
