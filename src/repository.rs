use crate::error::StoreError;
use crate::models::{Comment, NewUser, Post, Role, UpdatePostRequest, User};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

/// NewPost
///
/// Validated insert payload for a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author: String,
}

/// Repository Trait
///
/// Contract for every persistence operation. Handlers and the credential lifecycle
/// only see this trait, so the Postgres store and the in-memory store are
/// interchangeable.
///
/// Username uniqueness is the store's job: `create_user` must fail with
/// `StoreError::Duplicate` when the username exists, even under concurrent inserts.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Round-trip to the store, used by the database health check.
    async fn ping(&self) -> StoreResult<()>;

    // --- Credentials ---
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    // Sorted by username.
    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>>;
    async fn get_user_by_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>>;
    // Returns None when no user with that id holds `role`.
    async fn update_user_name(&self, id: Uuid, role: Role, name: String)
        -> StoreResult<Option<User>>;

    // --- Posts ---
    // Newest first.
    async fn list_posts(&self) -> StoreResult<Vec<Post>>;
    // Case-insensitive substring match on title or content.
    async fn search_posts(&self, query: &str) -> StoreResult<Vec<Post>>;
    async fn get_post(&self, id: Uuid) -> StoreResult<Option<Post>>;
    async fn create_post(&self, post: NewPost) -> StoreResult<Post>;
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> StoreResult<Option<Post>>;
    async fn delete_post(&self, id: Uuid) -> StoreResult<bool>;

    // --- Comments ---
    // Oldest first.
    async fn list_comments(&self, post_id: Uuid) -> StoreResult<Vec<Comment>>;
    // Returns None when the post does not exist.
    async fn add_comment(
        &self,
        post_id: Uuid,
        author: String,
        text: String,
    ) -> StoreResult<Option<Comment>>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer kept in the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, username, password_hash, name, role, created_at, updated_at";
const POST_COLUMNS: &str = "id, title, content, author, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, post_id, author, text, created_at, updated_at";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(e: sqlx::Error) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::Duplicate,
        _ => StoreError::Database(e),
    }
}

/// Escapes LIKE wildcards so the query is matched literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_user
    ///
    /// Relies on the `users_username_key` unique constraint for concurrent registrations.
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let query = format!(
            "INSERT INTO users (id, username, password_hash, name, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY username ASC");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(role)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_user_by_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND role = $2");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_user_name(
        &self,
        id: Uuid,
        role: Role,
        name: String,
    ) -> StoreResult<Option<User>> {
        let query = format!(
            "UPDATE users SET name = $3, updated_at = NOW() \
             WHERE id = $1 AND role = $2 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(role)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, Post>(&query).fetch_all(&self.pool).await?)
    }

    async fn search_posts(&self, query_text: &str) -> StoreResult<Vec<Post>> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE title ILIKE $1 OR content ILIKE $1 \
             ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(like_pattern(query_text))
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let query = format!(
            "INSERT INTO posts (id, title, content, author, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(Uuid::new_v4())
            .bind(post.title)
            .bind(post.content)
            .bind(post.author)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_post
    ///
    /// COALESCE keeps the stored value for every field the request leaves out.
    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> StoreResult<Option<Post>> {
        let query = format!(
            "UPDATE posts \
             SET title = COALESCE($2, title), \
                 content = COALESCE($3, content), \
                 author = COALESCE($4, author), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .bind(req.title)
            .bind(req.content)
            .bind(req.author)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_comments(&self, post_id: Uuid) -> StoreResult<Vec<Comment>> {
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = $1 ORDER BY created_at ASC"
        );
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// add_comment
    ///
    /// The insert only happens if the post exists, so a missing post yields no row
    /// instead of a foreign-key error.
    async fn add_comment(
        &self,
        post_id: Uuid,
        author: String,
        text: String,
    ) -> StoreResult<Option<Comment>> {
        let query = format!(
            "INSERT INTO comments (id, post_id, author, text, created_at, updated_at) \
             SELECT $1, p.id, $3, $4, NOW(), NOW() FROM posts p WHERE p.id = $2 \
             RETURNING {COMMENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(Uuid::new_v4())
            .bind(post_id)
            .bind(author)
            .bind(text)
            .fetch_optional(&self.pool)
            .await?)
    }
}

/// InMemoryRepository
///
/// `Repository` kept entirely in process memory. Used by the test suites and by
/// `STORE=memory` for local runs without Postgres. Enforces the same username
/// uniqueness contract as the Postgres schema.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    // Reverse insertion order first so equal timestamps still list the latest insert first.
    posts.reverse();
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    posts
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate);
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            password_hash: user.password_hash,
            name: user.name,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .iter()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn get_user_by_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.id == id && u.role == role)
            .cloned())
    }

    async fn update_user_name(
        &self,
        id: Uuid,
        role: Role,
        name: String,
    ) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .users
            .iter_mut()
            .find(|u| u.id == id && u.role == role)
            .map(|user| {
                user.name = Some(name);
                user.updated_at = Utc::now();
                user.clone()
            }))
    }

    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let tables = self.tables.read().await;
        Ok(newest_first(tables.posts.clone()))
    }

    async fn search_posts(&self, query: &str) -> StoreResult<Vec<Post>> {
        let needle = query.to_lowercase();
        let tables = self.tables.read().await;
        let matches = tables
            .posts
            .iter()
            .filter(|p| {
                p.title.to_lowercase().contains(&needle)
                    || p.content.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        Ok(newest_first(matches))
    }

    async fn get_post(&self, id: Uuid) -> StoreResult<Option<Post>> {
        let tables = self.tables.read().await;
        Ok(tables.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        let now = Utc::now();
        let created = Post {
            id: Uuid::new_v4(),
            title: post.title,
            content: post.content,
            author: post.author,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.posts.push(created.clone());
        Ok(created)
    }

    async fn update_post(&self, id: Uuid, req: UpdatePostRequest) -> StoreResult<Option<Post>> {
        let mut tables = self.tables.write().await;
        Ok(tables.posts.iter_mut().find(|p| p.id == id).map(|post| {
            if let Some(title) = req.title {
                post.title = title;
            }
            if let Some(content) = req.content {
                post.content = content;
            }
            if let Some(author) = req.author {
                post.author = author;
            }
            post.updated_at = Utc::now();
            post.clone()
        }))
    }

    async fn delete_post(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.posts.len();
        tables.posts.retain(|p| p.id != id);
        let removed = tables.posts.len() < before;
        if removed {
            tables.comments.retain(|c| c.post_id != id);
        }
        Ok(removed)
    }

    async fn list_comments(&self, post_id: Uuid) -> StoreResult<Vec<Comment>> {
        let tables = self.tables.read().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn add_comment(
        &self,
        post_id: Uuid,
        author: String,
        text: String,
    ) -> StoreResult<Option<Comment>> {
        let mut tables = self.tables.write().await;
        if !tables.posts.iter().any(|p| p.id == post_id) {
            return Ok(None);
        }

        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id,
            author,
            text,
            created_at: now,
            updated_at: now,
        };
        tables.comments.push(comment.clone());
        Ok(Some(comment))
    }
}
