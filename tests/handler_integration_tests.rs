use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use campus_blog::{
    ApiError, AppConfig, AppState, Identity, InMemoryRepository,
    handlers::{self, PostSearch},
    models::{
        CreateCommentRequest, CreateMemberRequest, CreatePostRequest, LoginRequest,
        RegisterRequest, Role, UpdateMemberRequest, UpdatePostRequest,
    },
    repository::RepositoryState,
};
use std::sync::Arc;
use uuid::Uuid;

// --- Helper Functions ---

fn create_test_state() -> AppState {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    AppState::new(repo, AppConfig::default())
}

fn teacher() -> Identity {
    Identity::user(Uuid::new_v4(), Role::Teacher)
}

fn post_request(title: &str, content: &str) -> CreatePostRequest {
    CreatePostRequest {
        title: Some(title.to_string()),
        content: Some(content.to_string()),
        author: None,
    }
}

fn member(name: &str, username: &str) -> CreateMemberRequest {
    CreateMemberRequest {
        name: Some(name.to_string()),
        username: Some(username.to_string()),
        password: Some("pw-123".to_string()),
    }
}

// --- Auth ---

#[tokio::test]
async fn test_register_then_login() {
    let state = create_test_state();

    let (status, Json(created)) = handlers::register(
        State(state.clone()),
        Ok(Json(RegisterRequest {
            username: Some("alice".into()),
            password: Some("s3cret".into()),
            role: Some("teacher".into()),
            name: Some("Alice".into()),
        })),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.user.role, Role::Teacher);
    assert_eq!(created.user.name.as_deref(), Some("Alice"));

    let Json(session) = handlers::login(
        State(state.clone()),
        Ok(Json(LoginRequest {
            username: Some("alice".into()),
            password: Some("s3cret".into()),
        })),
    )
    .await
    .unwrap();
    assert_eq!(session.username, "alice");
    assert_eq!(session.expires_in, 3600);

    let claims = state.authenticator.tokens().verify(&session.token).unwrap();
    assert_eq!(claims.sub, created.user.id);
    assert_eq!(claims.role, Role::Teacher);
}

#[tokio::test]
async fn test_register_trims_username_and_rejects_blank_password() {
    let state = create_test_state();

    let (_, Json(created)) = handlers::register(
        State(state.clone()),
        Ok(Json(RegisterRequest {
            username: Some("  carol  ".into()),
            password: Some("pw".into()),
            ..Default::default()
        })),
    )
    .await
    .unwrap();
    assert_eq!(created.user.username, "carol");
    assert_eq!(created.user.role, Role::Student);

    let err = handlers::register(
        State(state),
        Ok(Json(RegisterRequest {
            username: Some("dave".into()),
            password: Some(String::new()),
            ..Default::default()
        })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn test_login_with_missing_fields_is_validation_error() {
    let state = create_test_state();

    let err = handlers::login(State(state), Ok(Json(LoginRequest::default())))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_concurrent_registrations_admit_exactly_one() {
    let state = create_test_state();

    let attempts = (0..8).map(|i| {
        let state = state.clone();
        tokio::spawn(async move {
            handlers::register(
                State(state),
                Ok(Json(RegisterRequest {
                    username: Some("racer".into()),
                    password: Some(format!("pw-{i}")),
                    ..Default::default()
                })),
            )
            .await
        })
    });

    let mut created = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        match attempt.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert!(matches!(e, ApiError::DuplicateUsername)),
        }
    }
    assert_eq!(created, 1);

    let Json(students) = handlers::list_students(State(state)).await.unwrap();
    assert_eq!(students.len(), 1);
}

// --- Posts ---

#[tokio::test]
async fn test_create_post_handler_success() {
    let state = create_test_state();

    let (status, Json(post)) = handlers::create_post(
        teacher(),
        State(state.clone()),
        Ok(Json(CreatePostRequest {
            author: Some("Alice".into()),
            ..post_request("Traits", "Static dispatch")
        })),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post.author, "Alice");

    let Json(fetched) = handlers::get_post(State(state), Path(post.id.to_string()))
        .await
        .unwrap();
    assert_eq!(fetched, post);
}

#[tokio::test]
async fn test_create_post_handler_validation() {
    let state = create_test_state();

    let err = handlers::create_post(
        Identity::system(),
        State(state),
        Ok(Json(post_request("   ", "content"))),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn test_list_posts_newest_first_and_search() {
    let state = create_test_state();
    for title in ["first", "second", "third"] {
        let (status, _) = handlers::create_post(
            teacher(),
            State(state.clone()),
            Ok(Json(post_request(title, "body"))),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
    }

    let Json(posts) = handlers::list_posts(State(state.clone())).await.unwrap();
    let titles: Vec<_> = posts.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, ["third", "second", "first"]);

    let Json(found) = handlers::search_posts(
        State(state.clone()),
        Query(PostSearch {
            query: Some("SEC".into()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "second");

    let Json(none) = handlers::search_posts(
        State(state),
        Query(PostSearch {
            query: Some("missing".into()),
        }),
    )
    .await
    .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_update_post_rejects_blank_fields() {
    let state = create_test_state();
    let (_, Json(post)) = handlers::create_post(
        teacher(),
        State(state.clone()),
        Ok(Json(post_request("Closures", "Fn, FnMut, FnOnce"))),
    )
    .await
    .unwrap();

    for blank in [
        UpdatePostRequest {
            title: Some("   ".into()),
            ..Default::default()
        },
        UpdatePostRequest {
            content: Some(String::new()),
            ..Default::default()
        },
    ] {
        let err = handlers::update_post(
            teacher(),
            State(state.clone()),
            Path(post.id.to_string()),
            Ok(Json(blank)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    let Json(updated) = handlers::update_post(
        teacher(),
        State(state.clone()),
        Path(post.id.to_string()),
        Ok(Json(UpdatePostRequest {
            title: Some("  Closures in depth  ".into()),
            author: Some(" ".into()),
            ..Default::default()
        })),
    )
    .await
    .unwrap();
    assert_eq!(updated.title, "Closures in depth");
    assert_eq!(updated.content, "Fn, FnMut, FnOnce");
    assert_eq!(updated.author, "Anonymous");
}

#[tokio::test]
async fn test_update_and_delete_unknown_post_are_not_found() {
    let state = create_test_state();
    let unknown = Uuid::new_v4().to_string();

    let err = handlers::update_post(
        teacher(),
        State(state.clone()),
        Path(unknown.clone()),
        Ok(Json(UpdatePostRequest::default())),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = handlers::delete_post(teacher(), State(state.clone()), Path(unknown))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = handlers::get_post(State(state), Path("123".into()))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_handlers() {
    let state = create_test_state();
    let (_, Json(post)) = handlers::create_post(
        teacher(),
        State(state.clone()),
        Ok(Json(post_request("Lifetimes", "'a"))),
    )
    .await
    .unwrap();

    for (text, username) in [("first!", Some("bob")), ("second", None)] {
        let (status, _) = handlers::add_comment(
            teacher(),
            State(state.clone()),
            Path(post.id.to_string()),
            Ok(Json(CreateCommentRequest {
                text: Some(text.into()),
                username: username.map(String::from),
            })),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
    }

    let Json(comments) = handlers::list_comments(State(state.clone()), Path(post.id.to_string()))
        .await
        .unwrap();
    let authors: Vec<_> = comments.iter().map(|c| c.author.as_str()).collect();
    assert_eq!(authors, ["bob", "Anonymous"]);

    let err = handlers::add_comment(
        teacher(),
        State(state),
        Path(Uuid::new_v4().to_string()),
        Ok(Json(CreateCommentRequest {
            text: Some("orphan".into()),
            username: None,
        })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

// --- Members ---

#[tokio::test]
async fn test_member_handlers_are_scoped_by_role() {
    let state = create_test_state();

    let (_, Json(created)) = handlers::create_teacher(
        teacher(),
        State(state.clone()),
        Ok(Json(member("Grace", "grace"))),
    )
    .await
    .unwrap();
    assert_eq!(created.teacher.role, Role::Teacher);
    let id = created.teacher.id.to_string();

    let err = handlers::get_student(State(state.clone()), Path(id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = handlers::update_student(
        State(state.clone()),
        Path(id.clone()),
        Ok(Json(UpdateMemberRequest {
            name: Some("Nope".into()),
        })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let Json(updated) = handlers::update_teacher(
        State(state.clone()),
        Path(id.clone()),
        Ok(Json(UpdateMemberRequest {
            name: Some("Grace Hopper".into()),
        })),
    )
    .await
    .unwrap();
    assert_eq!(updated.teacher.name.as_deref(), Some("Grace Hopper"));
    assert_eq!(updated.teacher.username, "grace");

    let Json(fetched) = handlers::get_teacher(State(state), Path(id)).await.unwrap();
    assert_eq!(fetched, updated.teacher);
}

#[tokio::test]
async fn test_create_member_requires_all_fields() {
    let state = create_test_state();

    let err = handlers::create_student(
        teacher(),
        State(state),
        Ok(Json(CreateMemberRequest {
            name: None,
            ..member("", "stu")
        })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn test_error_response_shape() {
    let response = ApiError::Forbidden("Only teachers can perform this action".into()).into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Only teachers can perform this action");
    assert_eq!(body["code"], "forbidden");

    let response = ApiError::internal("connection refused").into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Internal details stay in the logs.
    assert!(!String::from_utf8_lossy(&bytes).contains("connection refused"));
}
