use crate::{
    AppState,
    auth::{Identity, credentials::{self, NewCredential}},
    error::{ApiError, ApiResult, ErrorBody},
    models::{
        self, ANONYMOUS_AUTHOR, Comment, CreateCommentRequest, CreateMemberRequest,
        CreatePostRequest, LoginRequest, LoginResponse, MessageResponse, Post, RegisterRequest,
        RegisterResponse, Role, StudentResponse, TeacherResponse, UpdateMemberRequest,
        UpdatePostRequest, UserProfile, non_blank,
    },
    repository::NewPost,
};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

/// Body extractor result as received by the handlers. Malformed JSON becomes a
/// `ValidationError` instead of axum's plain-text rejection.
pub type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// Ids that are not well-formed UUIDs are reported as missing resources.
fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found())
}

// --- Filter Structs ---

/// PostSearch
///
/// Query parameters for `GET /posts/search`.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct PostSearch {
    /// Case-insensitive search term matched against title and content.
    pub query: Option<String>,
}

// --- Health ---

/// db_health
///
/// [Public Route] Verifies the store answers a round-trip.
#[utoipa::path(
    get,
    path = "/health/db",
    responses(
        (status = 200, description = "Store reachable", body = MessageResponse),
        (status = 500, description = "Store unreachable", body = ErrorBody)
    )
)]
pub async fn db_health(State(state): State<AppState>) -> ApiResult<Json<MessageResponse>> {
    state.repo.ping().await?;
    Ok(Json(MessageResponse::new("Database connection successful!")))
}

// --- Auth ---

/// register
///
/// [Public Route, optionally guarded] Creates a teacher or student credential.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Duplicate username or invalid input", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    payload: JsonBody<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let Json(payload) = payload?;
    let credential = NewCredential::from_registration(payload)?;
    let user = credentials::register(state.repo.as_ref(), credential).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully".to_string(),
            user,
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges a username/password pair for a signed token.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Missing fields", body = ErrorBody),
        (status = 401, description = "Invalid username or password", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: JsonBody<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(payload) = payload?;
    let response =
        credentials::login(state.repo.as_ref(), state.authenticator.as_ref(), payload).await?;
    Ok(Json(response))
}

// --- Posts ---

/// list_posts
///
/// [Protected Route] Lists every post, newest first.
#[utoipa::path(
    get,
    path = "/posts",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List of posts", body = [Post]),
        (status = 401, description = "Missing or invalid credential", body = ErrorBody)
    )
)]
pub async fn list_posts(State(state): State<AppState>) -> ApiResult<Json<Vec<models::Post>>> {
    Ok(Json(state.repo.list_posts().await?))
}

/// search_posts
///
/// [Protected Route] Posts whose title or content contains the query, ignoring case.
#[utoipa::path(
    get,
    path = "/posts/search",
    params(PostSearch),
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Search results", body = [Post]))
)]
pub async fn search_posts(
    State(state): State<AppState>,
    Query(search): Query<PostSearch>,
) -> ApiResult<Json<Vec<models::Post>>> {
    let query = search.query.unwrap_or_default();
    Ok(Json(state.repo.search_posts(query.trim()).await?))
}

/// get_post
///
/// [Protected Route] A single post by id.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = String, Path, description = "Post ID")),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Post object", body = Post),
        (status = 404, description = "Post not found", body = ErrorBody)
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<models::Post>> {
    let id = parse_id(&id)?;
    state
        .repo
        .get_post(id)
        .await?
        .map(Json)
        .ok_or_else(post_not_found)
}

/// create_post
///
/// [Protected Route] Creates a post. `author` defaults to "Anonymous".
#[utoipa::path(
    post,
    path = "/posts",
    request_body = CreatePostRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Missing title or content", body = ErrorBody)
    )
)]
pub async fn create_post(
    identity: Identity,
    State(state): State<AppState>,
    payload: JsonBody<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<models::Post>)> {
    let Json(payload) = payload?;
    let (Some(title), Some(content)) = (non_blank(payload.title), non_blank(payload.content))
    else {
        return Err(ApiError::validation("title and content are required"));
    };

    let post = state
        .repo
        .create_post(NewPost {
            title,
            content,
            author: non_blank(payload.author).unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string()),
        })
        .await?;

    tracing::info!(post_id = %post.id, subject = ?identity.subject, system = identity.is_system, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Protected Route] Partial update; absent fields are left unchanged. A blank author
/// resets it to "Anonymous".
#[utoipa::path(
    put,
    path = "/posts/{id}",
    params(("id" = String, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Updated post", body = Post),
        (status = 400, description = "Blank title or content", body = ErrorBody),
        (status = 404, description = "Post not found", body = ErrorBody)
    )
)]
pub async fn update_post(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: JsonBody<UpdatePostRequest>,
) -> ApiResult<Json<models::Post>> {
    let id = parse_id(&id)?;
    let Json(payload) = payload?;

    let is_blank = |field: &Option<String>| field.as_deref().is_some_and(|v| v.trim().is_empty());
    if is_blank(&payload.title) || is_blank(&payload.content) {
        return Err(ApiError::validation("title and content cannot be blank"));
    }
    let changes = UpdatePostRequest {
        title: non_blank(payload.title),
        content: non_blank(payload.content),
        author: payload
            .author
            .map(|author| non_blank(Some(author)).unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string())),
    };

    let post = state
        .repo
        .update_post(id, changes)
        .await?
        .ok_or_else(post_not_found)?;

    tracing::info!(post_id = %post.id, subject = ?identity.subject, "post updated");
    Ok(Json(post))
}

/// delete_post
///
/// [Protected Route] Deletes a post together with its comments.
#[utoipa::path(
    delete,
    path = "/posts/{id}",
    params(("id" = String, Path, description = "Post ID")),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Post successfully deleted", body = MessageResponse),
        (status = 404, description = "Post not found", body = ErrorBody)
    )
)]
pub async fn delete_post(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = parse_id(&id)?;
    if !state.repo.delete_post(id).await? {
        return Err(post_not_found());
    }

    tracing::info!(post_id = %id, subject = ?identity.subject, "post deleted");
    Ok(Json(MessageResponse::new("Post successfully deleted")))
}

fn post_not_found() -> ApiError {
    ApiError::NotFound("Post not found".to_string())
}

// --- Comments ---

/// list_comments
///
/// [Public Route] Comments of a post, oldest first.
#[utoipa::path(
    get,
    path = "/posts/{id}/comments",
    params(("id" = String, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Comments", body = [Comment]),
        (status = 404, description = "Post not found", body = ErrorBody)
    )
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> ApiResult<Json<Vec<models::Comment>>> {
    let post_id = parse_id(&post_id).map_err(|_| post_not_found())?;
    if state.repo.get_post(post_id).await?.is_none() {
        return Err(post_not_found());
    }
    Ok(Json(state.repo.list_comments(post_id).await?))
}

/// add_comment
///
/// [Protected Route] Adds a comment; the author is the body's `username` or "Anonymous".
#[utoipa::path(
    post,
    path = "/posts/{id}/comments",
    params(("id" = String, Path, description = "Post ID")),
    request_body = CreateCommentRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 400, description = "Comment text is required", body = ErrorBody),
        (status = 404, description = "Post not found", body = ErrorBody)
    )
)]
pub async fn add_comment(
    identity: Identity,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    payload: JsonBody<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<models::Comment>)> {
    let post_id = parse_id(&post_id).map_err(|_| post_not_found())?;
    let Json(payload) = payload?;
    let text = non_blank(payload.text).ok_or_else(|| ApiError::validation("Comment text is required"))?;
    let author = non_blank(payload.username).unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string());

    let comment = state
        .repo
        .add_comment(post_id, author, text)
        .await?
        .ok_or_else(post_not_found)?;

    tracing::info!(comment_id = %comment.id, %post_id, subject = ?identity.subject, "comment added");
    Ok((StatusCode::CREATED, Json(comment)))
}

// --- Members (students & teachers) ---

async fn list_members(state: &AppState, role: Role) -> ApiResult<Vec<UserProfile>> {
    let users = state.repo.list_users_by_role(role).await?;
    Ok(users.into_iter().map(UserProfile::from).collect())
}

async fn get_member(state: &AppState, raw_id: &str, role: Role) -> ApiResult<UserProfile> {
    let id = parse_id(raw_id)?;
    state
        .repo
        .get_user_by_role(id, role)
        .await?
        .map(UserProfile::from)
        .ok_or_else(ApiError::not_found)
}

async fn create_member(
    state: &AppState,
    identity: &Identity,
    payload: CreateMemberRequest,
    role: Role,
) -> ApiResult<UserProfile> {
    let credential = NewCredential::from_member(payload, role)?;
    let member = credentials::register(state.repo.as_ref(), credential).await?;
    tracing::info!(member_id = %member.id, %role, created_by = ?identity.subject, "member created");
    Ok(member)
}

async fn rename_member(
    state: &AppState,
    raw_id: &str,
    payload: UpdateMemberRequest,
    role: Role,
) -> ApiResult<UserProfile> {
    let id = parse_id(raw_id)?;
    let name = non_blank(payload.name).ok_or_else(|| ApiError::validation("name is required"))?;
    state
        .repo
        .update_user_name(id, role, name)
        .await?
        .map(UserProfile::from)
        .ok_or_else(ApiError::not_found)
}

/// list_students
///
/// [Teacher Route] All students, sorted by username.
#[utoipa::path(
    get,
    path = "/students",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Students", body = [UserProfile]),
        (status = 403, description = "Not a teacher", body = ErrorBody)
    )
)]
pub async fn list_students(State(state): State<AppState>) -> ApiResult<Json<Vec<UserProfile>>> {
    Ok(Json(list_members(&state, Role::Student).await?))
}

/// get_student
#[utoipa::path(
    get,
    path = "/students/{id}",
    params(("id" = String, Path, description = "Student ID")),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Student", body = UserProfile),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(get_member(&state, &id, Role::Student).await?))
}

/// create_student
///
/// [Teacher Route] Creates a student account. The role is forced to `student`.
#[utoipa::path(
    post,
    path = "/students",
    request_body = CreateMemberRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Student created", body = StudentResponse),
        (status = 400, description = "Invalid input or duplicate username", body = ErrorBody)
    )
)]
pub async fn create_student(
    identity: Identity,
    State(state): State<AppState>,
    payload: JsonBody<CreateMemberRequest>,
) -> ApiResult<(StatusCode, Json<StudentResponse>)> {
    let Json(payload) = payload?;
    let student = create_member(&state, &identity, payload, Role::Student).await?;
    Ok((
        StatusCode::CREATED,
        Json(StudentResponse {
            message: "Student created successfully".to_string(),
            student,
        }),
    ))
}

/// update_student
///
/// [Teacher Route] Renames a student. Only `name` can change.
#[utoipa::path(
    put,
    path = "/students/{id}",
    params(("id" = String, Path, description = "Student ID")),
    request_body = UpdateMemberRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Student updated", body = StudentResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: JsonBody<UpdateMemberRequest>,
) -> ApiResult<Json<StudentResponse>> {
    let Json(payload) = payload?;
    let student = rename_member(&state, &id, payload, Role::Student).await?;
    Ok(Json(StudentResponse {
        message: "Student updated successfully".to_string(),
        student,
    }))
}

/// list_teachers
///
/// [Teacher Route] All teachers, sorted by username.
#[utoipa::path(
    get,
    path = "/teachers",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Teachers", body = [UserProfile]),
        (status = 403, description = "Not a teacher", body = ErrorBody)
    )
)]
pub async fn list_teachers(State(state): State<AppState>) -> ApiResult<Json<Vec<UserProfile>>> {
    Ok(Json(list_members(&state, Role::Teacher).await?))
}

/// get_teacher
#[utoipa::path(
    get,
    path = "/teachers/{id}",
    params(("id" = String, Path, description = "Teacher ID")),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Teacher", body = UserProfile),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_teacher(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(get_member(&state, &id, Role::Teacher).await?))
}

/// create_teacher
///
/// [Teacher Route] Creates a teacher account. The role is forced to `teacher`.
#[utoipa::path(
    post,
    path = "/teachers",
    request_body = CreateMemberRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Teacher created", body = TeacherResponse),
        (status = 400, description = "Invalid input or duplicate username", body = ErrorBody),
        (status = 403, description = "Not a teacher", body = ErrorBody)
    )
)]
pub async fn create_teacher(
    identity: Identity,
    State(state): State<AppState>,
    payload: JsonBody<CreateMemberRequest>,
) -> ApiResult<(StatusCode, Json<TeacherResponse>)> {
    let Json(payload) = payload?;
    let teacher = create_member(&state, &identity, payload, Role::Teacher).await?;
    Ok((
        StatusCode::CREATED,
        Json(TeacherResponse {
            message: "Teacher created successfully".to_string(),
            teacher,
        }),
    ))
}

/// update_teacher
///
/// [Teacher Route] Renames a teacher. Only `name` can change.
#[utoipa::path(
    put,
    path = "/teachers/{id}",
    params(("id" = String, Path, description = "Teacher ID")),
    request_body = UpdateMemberRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Teacher updated", body = TeacherResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn update_teacher(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: JsonBody<UpdateMemberRequest>,
) -> ApiResult<Json<TeacherResponse>> {
    let Json(payload) = payload?;
    let teacher = rename_member(&state, &id, payload, Role::Teacher).await?;
    Ok(Json(TeacherResponse {
        message: "Teacher updated successfully".to_string(),
        teacher,
    }))
}
