use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{
    like_pattern, CountColumn, DatabaseInterface, ParentFilter, PostQuery, ProfileSource,
};
use crate::models::{
    current_time_millis, millis_to_datetime, Edge, EdgeKind, NewPost, Post, PostRow, Profile,
    ProfileUpdate, UserRole,
};

const POST_COLUMNS: &str = "p.id, p.author_id, p.content, p.media_urls, p.parent_id, p.repost_of, \
     p.created_at, p.updated_at, \
     a.id AS a_id, a.username AS a_username, a.display_name AS a_display_name, a.bio AS a_bio, \
     a.avatar_url AS a_avatar_url, a.banner_url AS a_banner_url, a.role AS a_role, \
     a.created_at AS a_created_at, a.updated_at AS a_updated_at";

const PROFILE_COLUMNS: &str =
    "id, username, display_name, bio, avatar_url, banner_url, role, created_at, updated_at";

/// SQLite implementation of the database interface
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Connect to a database file (created if missing) and make sure the schema exists.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Configuration(format!("Invalid database url {}: {}", url, e)))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to {}: {}", url, e)))?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// In-memory database on a single pinned connection, for tests and demos.
    pub async fn new_in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::Configuration(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Health check to verify database connectivity
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    /// Create tables and indexes for profiles, posts and association edges
    pub async fn initialize(&self) -> AppResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id BLOB PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                bio TEXT NOT NULL DEFAULT '',
                avatar_url TEXT,
                banner_url TEXT,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id BLOB PRIMARY KEY,
                author_id BLOB NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                media_urls TEXT NOT NULL DEFAULT '[]',
                parent_id BLOB REFERENCES posts(id) ON DELETE CASCADE,
                repost_of BLOB REFERENCES posts(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS likes (
                user_id BLOB NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                post_id BLOB NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, post_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS bookmarks (
                user_id BLOB NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                post_id BLOB NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, post_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS follows (
                follower_id BLOB NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                following_id BLOB NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (follower_id, following_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC, id DESC)",
            "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id, created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_posts_parent ON posts(parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_posts_repost_of ON posts(repost_of)",
            "CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id)",
            "CREATE INDEX IF NOT EXISTS idx_bookmarks_post ON bookmarks(post_id)",
            "CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(format!("Failed to initialize schema: {}", e)))?;
        }

        Ok(())
    }

    /// Like and bookmark rows for a set of posts, keyed by post id
    async fn edge_sources_for(
        &self,
        kind: EdgeKind,
        post_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, Vec<Uuid>>> {
        let mut grouped: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        if post_ids.is_empty() {
            return Ok(grouped);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {tgt} AS target, {src} AS source FROM {table} WHERE {tgt} IN (",
            tgt = kind.target_column(),
            src = kind.source_column(),
            table = kind.table(),
        ));
        let mut separated = qb.separated(", ");
        for id in post_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(|e| {
            AppError::Database(format!("Failed to load {} rows: {}", kind.as_str(), e))
        })?;

        for row in rows {
            let target: Uuid = row.try_get("target")?;
            let source: Uuid = row.try_get("source")?;
            grouped.entry(target).or_default().push(source);
        }
        Ok(grouped)
    }

    /// Attach like and bookmark rows to bare post/author rows
    async fn hydrate(&self, rows: Vec<SqliteRow>) -> AppResult<Vec<PostRow>> {
        let mut base = Vec::with_capacity(rows.len());
        for row in &rows {
            base.push((post_from_row(row)?, profile_from_row(row, "a_")?));
        }

        let ids: Vec<Uuid> = base.iter().map(|(post, _)| post.id).collect();
        let mut likes = self.edge_sources_for(EdgeKind::Like, &ids).await?;
        let mut bookmarks = self.edge_sources_for(EdgeKind::Bookmark, &ids).await?;

        Ok(base
            .into_iter()
            .map(|(post, author)| PostRow {
                liked_by: likes.remove(&post.id).unwrap_or_default(),
                bookmarked_by: bookmarks.remove(&post.id).unwrap_or_default(),
                post,
                author,
            })
            .collect())
    }

    async fn get_bare_post(&self, id: Uuid) -> AppResult<Option<Post>> {
        let row = sqlx::query(
            "SELECT id, author_id, content, media_urls, parent_id, repost_of, created_at, updated_at \
             FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get post {}: {}", id, e)))?;

        row.as_ref().map(post_from_row).transpose()
    }
}

fn profile_from_row(row: &SqliteRow, prefix: &str) -> AppResult<Profile> {
    let col = |name: &str| format!("{}{}", prefix, name);
    let role: String = row.try_get(col("role").as_str())?;

    Ok(Profile {
        id: row.try_get(col("id").as_str())?,
        username: row.try_get(col("username").as_str())?,
        display_name: row.try_get(col("display_name").as_str())?,
        bio: row.try_get(col("bio").as_str())?,
        avatar_url: row.try_get(col("avatar_url").as_str())?,
        banner_url: row.try_get(col("banner_url").as_str())?,
        role: role.parse::<UserRole>()?,
        created_at: millis_to_datetime(row.try_get(col("created_at").as_str())?),
        updated_at: millis_to_datetime(row.try_get(col("updated_at").as_str())?),
    })
}

fn post_from_row(row: &SqliteRow) -> AppResult<Post> {
    let media: String = row.try_get("media_urls")?;
    let media_urls: Vec<String> = serde_json::from_str(&media)
        .map_err(|e| AppError::Database(format!("Corrupt media_urls column: {}", e)))?;

    Ok(Post {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        content: row.try_get("content")?,
        media_urls,
        parent_id: row.try_get("parent_id")?,
        repost_of: row.try_get("repost_of")?,
        created_at: millis_to_datetime(row.try_get("created_at")?),
        updated_at: millis_to_datetime(row.try_get("updated_at")?),
    })
}

/// Map constraint failures on writes onto request-level errors
fn write_error(err: sqlx::Error, context: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return AppError::Conflict(format!("{}: already exists", context));
        }
        if db_err.is_foreign_key_violation() {
            return AppError::NotFound(format!("{}: referenced row does not exist", context));
        }
    }
    AppError::Database(format!("{}: {}", context, err))
}

#[async_trait]
impl DatabaseInterface for SqliteDatabase {
    async fn get_profile(&self, id: Uuid) -> AppResult<Option<Profile>> {
        let row = sqlx::query(&format!("SELECT {} FROM profiles WHERE id = ?", PROFILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to get profile {}: {}", id, e)))?;

        row.map(|r| profile_from_row(&r, "")).transpose()
    }

    async fn get_profile_by_username(&self, username: &str) -> AppResult<Option<Profile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE username = ?",
            PROFILE_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get profile @{}: {}", username, e)))?;

        row.map(|r| profile_from_row(&r, "")).transpose()
    }

    async fn create_profile(&self, profile: &Profile) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO profiles (id, username, display_name, bio, avatar_url, banner_url, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(profile.id)
        .bind(&profile.username)
        .bind(&profile.display_name)
        .bind(&profile.bio)
        .bind(&profile.avatar_url)
        .bind(&profile.banner_url)
        .bind(profile.role.as_str())
        .bind(profile.created_at.timestamp_millis())
        .bind(profile.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("Failed to create profile @{}", profile.username)))?;
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> AppResult<Profile> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE profiles SET updated_at = ");
        qb.push_bind(current_time_millis());

        if let Some(username) = &update.username {
            qb.push(", username = ").push_bind(username.clone());
        }
        if let Some(display_name) = &update.display_name {
            qb.push(", display_name = ").push_bind(display_name.clone());
        }
        if let Some(bio) = &update.bio {
            qb.push(", bio = ").push_bind(bio.clone());
        }
        if let Some(avatar_url) = &update.avatar_url {
            qb.push(", avatar_url = ").push_bind(avatar_url.clone());
        }
        if let Some(banner_url) = &update.banner_url {
            qb.push(", banner_url = ").push_bind(banner_url.clone());
        }
        if let Some(role) = update.role {
            qb.push(", role = ").push_bind(role.as_str());
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, &format!("Failed to update profile {}", id)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Profile {} not found", id)));
        }

        self.get_profile(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", id)))
    }

    async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM profiles ORDER BY created_at ASC, id ASC",
            PROFILE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list profiles: {}", e)))?;

        rows.iter().map(|r| profile_from_row(r, "")).collect()
    }

    async fn search_profiles(&self, needle: &str, limit: usize) -> AppResult<Vec<Profile>> {
        let pattern = like_pattern(needle);
        let rows = sqlx::query(&format!(
            "SELECT {} FROM profiles \
             WHERE username LIKE ? ESCAPE '\\' OR display_name LIKE ? ESCAPE '\\' \
             LIMIT ?",
            PROFILE_COLUMNS
        ))
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to search profiles: {}", e)))?;

        rows.iter().map(|r| profile_from_row(r, "")).collect()
    }

    async fn get_post(&self, id: Uuid) -> AppResult<Option<PostRow>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM posts p JOIN profiles a ON a.id = p.author_id WHERE p.id = ?",
            POST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to get post {}: {}", id, e)))?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn query_posts(&self, query: &PostQuery) -> AppResult<Vec<PostRow>> {
        if query.limit == 0
            || query.ids.as_ref().is_some_and(|ids| ids.is_empty())
            || query.authors.as_ref().is_some_and(|authors| authors.is_empty())
        {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM posts p JOIN profiles a ON a.id = p.author_id WHERE 1 = 1",
            POST_COLUMNS
        ));

        if !query.include_reposts {
            qb.push(" AND p.repost_of IS NULL");
        }

        match query.parent {
            ParentFilter::Any => {}
            ParentFilter::TopLevel => {
                qb.push(" AND p.parent_id IS NULL");
            }
            ParentFilter::RepliesOnly => {
                qb.push(" AND p.parent_id IS NOT NULL");
            }
            ParentFilter::ChildrenOf(parent_id) => {
                qb.push(" AND p.parent_id = ").push_bind(parent_id);
            }
        }

        if let Some(ids) = &query.ids {
            qb.push(" AND p.id IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }

        if let Some(authors) = &query.authors {
            qb.push(" AND p.author_id IN (");
            let mut separated = qb.separated(", ");
            for author in authors {
                separated.push_bind(*author);
            }
            separated.push_unseparated(")");
        }

        if let Some(needle) = &query.content_contains {
            qb.push(" AND p.content LIKE ")
                .push_bind(like_pattern(needle))
                .push(" ESCAPE '\\'");
        }

        if let Some(key) = query.before {
            qb.push(" AND (p.created_at < ")
                .push_bind(key.created_at)
                .push(" OR (p.created_at = ")
                .push_bind(key.created_at)
                .push(" AND p.id < ")
                .push_bind(key.id)
                .push("))");
        }

        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
            .push_bind(query.limit as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to query posts: {}", e)))?;

        self.hydrate(rows).await
    }

    async fn insert_post(&self, post: &NewPost) -> AppResult<PostRow> {
        let id = Uuid::new_v4();
        let now = current_time_millis();
        let media = serde_json::to_string(&post.media_urls)
            .map_err(|e| AppError::Internal(format!("Failed to encode media urls: {}", e)))?;

        sqlx::query(
            "INSERT INTO posts (id, author_id, content, media_urls, parent_id, repost_of, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(post.author_id)
        .bind(&post.content)
        .bind(media)
        .bind(post.parent_id)
        .bind(post.repost_of)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "Failed to create post"))?;

        self.get_post(id)
            .await?
            .ok_or_else(|| AppError::Database(format!("Post {} vanished after insert", id)))
    }

    async fn update_post_content(&self, id: Uuid, content: &str) -> AppResult<Post> {
        let result = sqlx::query("UPDATE posts SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(current_time_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, &format!("Failed to update post {}", id)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Post {} not found", id)));
        }

        self.get_bare_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", id)))
    }

    async fn delete_post(&self, id: Uuid) -> AppResult<Option<Post>> {
        let Some(post) = self.get_bare_post(id).await? else {
            return Ok(None);
        };

        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, &format!("Failed to delete post {}", id)))?;

        Ok((result.rows_affected() > 0).then_some(post))
    }

    async fn count_posts_grouped(
        &self,
        column: CountColumn,
        ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, u64>> {
        let mut counts = HashMap::new();
        if ids.is_empty() {
            return Ok(counts);
        }

        let col = column.column();
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {col} AS target, COUNT(*) AS n FROM posts WHERE {col} IN ("
        ));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        qb.push(format!(" GROUP BY {col}"));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count posts by {}: {}", col, e)))?;

        for row in rows {
            let target: Uuid = row.try_get("target")?;
            let n: i64 = row.try_get("n")?;
            counts.insert(target, n as u64);
        }
        Ok(counts)
    }

    async fn count_posts_by_author(&self, author_id: Uuid) -> AppResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE author_id = ? AND repost_of IS NULL")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to count posts: {}", e)))?;
        Ok(n as u64)
    }

    async fn create_edge(&self, edge: Edge) -> AppResult<bool> {
        let kind = edge.kind;
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} ({}, {}, created_at) VALUES (?, ?, ?)",
            kind.table(),
            kind.source_column(),
            kind.target_column()
        ))
        .bind(edge.source)
        .bind(edge.target)
        .bind(current_time_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("Failed to create {}", kind.as_str())))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_edge(&self, edge: Edge) -> AppResult<bool> {
        let kind = edge.kind;
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            kind.table(),
            kind.source_column(),
            kind.target_column()
        ))
        .bind(edge.source)
        .bind(edge.target)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("Failed to delete {}", kind.as_str())))?;

        Ok(result.rows_affected() > 0)
    }

    async fn edge_exists(&self, edge: Edge) -> AppResult<bool> {
        let kind = edge.kind;
        let row = sqlx::query(&format!(
            "SELECT 1 FROM {} WHERE {} = ? AND {} = ?",
            kind.table(),
            kind.source_column(),
            kind.target_column()
        ))
        .bind(edge.source)
        .bind(edge.target)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to check {}: {}", kind.as_str(), e)))?;

        Ok(row.is_some())
    }

    async fn edge_targets(&self, kind: EdgeKind, source: Uuid) -> AppResult<Vec<Uuid>> {
        let targets: Vec<Uuid> = sqlx::query_scalar(&format!(
            "SELECT {} FROM {} WHERE {} = ? ORDER BY created_at DESC",
            kind.target_column(),
            kind.table(),
            kind.source_column()
        ))
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to list {} edges: {}", kind.as_str(), e)))?;

        Ok(targets)
    }

    async fn count_edges_from(&self, kind: EdgeKind, source: Uuid) -> AppResult<u64> {
        let n: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            kind.table(),
            kind.source_column()
        ))
        .bind(source)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to count {} edges: {}", kind.as_str(), e)))?;
        Ok(n as u64)
    }

    async fn count_edges_to(&self, kind: EdgeKind, target: Uuid) -> AppResult<u64> {
        let n: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            kind.table(),
            kind.target_column()
        ))
        .bind(target)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to count {} edges: {}", kind.as_str(), e)))?;
        Ok(n as u64)
    }
}

#[async_trait]
impl ProfileSource for SqliteDatabase {
    async fn fetch_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        self.get_profile(user_id).await
    }
}
