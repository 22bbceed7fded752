// Auth Store - credential and session tables behind the auth provider
// Sign-up provisions the matching profile row in the same transaction.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{millis_to_datetime, UserRole};

const INVALID_CREDENTIALS: &str = "Invalid login credentials";
const TOKEN_LEN: usize = 48;

/// Metadata attached at sign-up, used to provision the profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub metadata: UserMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user: AuthUser,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthStore {
    pool: SqlitePool,
    token_ttl: Duration,
}

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

async fn hash_password(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt_bytes: [u8; 16] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AppError::Internal(format!("Failed to encode salt: {}", e)))?;
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

async fn verify_password(password: String, stored: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored)
            .map_err(|e| AppError::Internal(format!("Corrupt password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
}

impl AuthStore {
    /// Create the auth tables. The profiles table must already exist.
    pub async fn new(pool: SqlitePool, token_ttl_secs: i64) -> AppResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auth_users (
                id BLOB PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                username TEXT NOT NULL,
                full_name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create auth_users table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auth_sessions (
                token TEXT PRIMARY KEY,
                user_id BLOB NOT NULL REFERENCES auth_users(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create auth_sessions table: {}", e)))?;

        Ok(Self {
            pool,
            token_ttl: Duration::seconds(token_ttl_secs),
        })
    }

    /// Register credentials and provision the profile row from the metadata.
    #[instrument(skip(self, password, metadata), fields(username = %metadata.username))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> AppResult<AuthUser> {
        let email = email.trim().to_lowercase();
        let password_hash = hash_password(password.to_string()).await?;
        let id = Uuid::new_v4();
        let now = Utc::now();
        let display_name = if metadata.full_name.trim().is_empty() {
            metadata.username.clone()
        } else {
            metadata.full_name.trim().to_string()
        };

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO auth_users (id, email, password_hash, username, full_name, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&email)
        .bind(&password_hash)
        .bind(&metadata.username)
        .bind(&metadata.full_name)
        .bind(now.timestamp_millis())
        .execute(&mut *tx)
        .await;
        if let Err(sqlx::Error::Database(db_err)) = &inserted {
            if db_err.is_unique_violation() {
                return Err(AppError::Auth("User already registered".to_string()));
            }
        }
        inserted.map_err(|e| AppError::Auth(format!("Sign up failed: {}", e)))?;

        let profile = sqlx::query(
            "INSERT INTO profiles (id, username, display_name, bio, role, created_at, updated_at) \
             VALUES (?, ?, ?, '', ?, ?, ?)",
        )
        .bind(id)
        .bind(&metadata.username)
        .bind(&display_name)
        .bind(UserRole::User.as_str())
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&mut *tx)
        .await;
        if let Err(sqlx::Error::Database(db_err)) = &profile {
            if db_err.is_unique_violation() {
                return Err(AppError::Conflict(format!(
                    "Username {} is already taken",
                    metadata.username
                )));
            }
        }
        profile.map_err(|e| AppError::Auth(format!("Sign up failed: {}", e)))?;

        tx.commit().await?;
        info!(user_id = %id, "user registered");

        Ok(AuthUser {
            id,
            email,
            metadata,
            created_at: millis_to_datetime(now.timestamp_millis()),
        })
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let email = email.trim().to_lowercase();
        let row = sqlx::query("SELECT id, password_hash FROM auth_users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            warn!("sign in for unknown email");
            return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
        };
        let user_id: Uuid = row.try_get("id")?;
        let stored: String = row.try_get("password_hash")?;

        if !verify_password(password.to_string(), stored).await? {
            warn!(%user_id, "sign in with wrong password");
            return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
        }

        self.issue_session(user_id).await
    }

    pub async fn sign_out(&self, token: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rotate a live token. `None` when the token is unknown or expired.
    pub async fn refresh(&self, token: &str) -> AppResult<Option<Session>> {
        let Some(user) = self.user_for_token(token).await? else {
            return Ok(None);
        };
        self.sign_out(token).await?;
        self.issue_session(user.id).await.map(Some)
    }

    /// Resolve a bearer token to its user. Expired tokens are purged on sight.
    pub async fn user_for_token(&self, token: &str) -> AppResult<Option<AuthUser>> {
        let row = sqlx::query("SELECT user_id, expires_at FROM auth_sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: i64 = row.try_get("expires_at")?;
        if expires_at <= Utc::now().timestamp_millis() {
            self.sign_out(token).await?;
            return Ok(None);
        }

        let user_id: Uuid = row.try_get("user_id")?;
        self.get_user(user_id).await
    }

    pub async fn get_user(&self, user_id: Uuid) -> AppResult<Option<AuthUser>> {
        let row = sqlx::query(
            "SELECT id, email, username, full_name, created_at FROM auth_users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> AppResult<AuthUser> {
            Ok(AuthUser {
                id: row.try_get("id")?,
                email: row.try_get("email")?,
                metadata: UserMetadata {
                    username: row.try_get("username")?,
                    full_name: row.try_get("full_name")?,
                },
                created_at: millis_to_datetime(row.try_get("created_at")?),
            })
        })
        .transpose()
    }

    async fn issue_session(&self, user_id: Uuid) -> AppResult<Session> {
        let user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::Auth(INVALID_CREDENTIALS.to_string()))?;
        let token = generate_token();
        let now = Utc::now();
        let expires_at = now + self.token_ttl;

        sqlx::query(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(now.timestamp_millis())
        .bind(expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(Session {
            access_token: token,
            user,
            expires_at: millis_to_datetime(expires_at.timestamp_millis()),
        })
    }
}
