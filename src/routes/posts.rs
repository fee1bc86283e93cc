use crate::{AppState, handlers, routes::authenticated};
use axum::{
    Router,
    routing::{get, post},
};

/// Posts Router Module
///
/// Reads, writes and comment creation are separate groups so each can carry its own
/// `AuthPolicy`. Listing comments is public.
pub fn post_routes(state: &AppState) -> Router<AppState> {
    let policies = state.config.policies;

    let reads = Router::new()
        // GET /posts
        .route("/posts", get(handlers::list_posts))
        // GET /posts/search?query=...
        .route("/posts/search", get(handlers::search_posts))
        // GET /posts/{id}
        .route("/posts/{id}", get(handlers::get_post));

    let writes = Router::new()
        // POST /posts
        .route("/posts", post(handlers::create_post))
        // PUT/DELETE /posts/{id}
        .route(
            "/posts/{id}",
            axum::routing::put(handlers::update_post).delete(handlers::delete_post),
        );

    // POST /posts/{id}/comments
    let comment_writes = Router::new().route("/posts/{id}/comments", post(handlers::add_comment));

    // GET /posts/{id}/comments
    let comment_reads = Router::new().route("/posts/{id}/comments", get(handlers::list_comments));

    Router::new()
        .merge(authenticated(reads, state, policies.posts_read))
        .merge(authenticated(writes, state, policies.posts_write))
        .merge(authenticated(comment_writes, state, policies.comments_write))
        .merge(comment_reads)
}
