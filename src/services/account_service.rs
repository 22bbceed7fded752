// AccountService - registration, sign-in and sign-out over the auth store

use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::infrastructure::auth_store::{AuthStore, AuthUser, Session, UserMetadata};
use crate::infrastructure::database::DatabaseInterface;
use crate::services::profile_service::validate_username;

pub const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
}

impl Registration {
    pub fn metadata(&self) -> UserMetadata {
        UserMetadata {
            username: self.username.trim().to_string(),
            full_name: self.full_name.trim().to_string(),
        }
    }
}

pub fn validate_registration(registration: &Registration) -> AppResult<()> {
    validate_username(registration.username.trim())?;
    if !registration.email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if registration.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct AccountService {
    db: Arc<dyn DatabaseInterface>,
    auth: Arc<AuthStore>,
}

impl AccountService {
    pub fn new(db: Arc<dyn DatabaseInterface>, auth: Arc<AuthStore>) -> Self {
        Self { db, auth }
    }

    /// Validate, reject taken handles, then register. The profile row is
    /// provisioned together with the credentials.
    #[instrument(skip(self, registration), fields(username = %registration.username))]
    pub async fn register(&self, registration: Registration) -> AppResult<AuthUser> {
        validate_registration(&registration)?;
        let metadata = registration.metadata();

        if self
            .db
            .get_profile_by_username(&metadata.username)
            .await
            .map_err(AppError::into_query)?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Username {} is already taken",
                metadata.username
            )));
        }

        let user = self
            .auth
            .sign_up(&registration.email, &registration.password, metadata)
            .await?;
        info!(user_id = %user.id, "account created");
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        self.auth.sign_in(email, password).await
    }

    pub async fn sign_out(&self, token: &str) -> AppResult<()> {
        self.auth.sign_out(token).await
    }
}
