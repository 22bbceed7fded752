// ProfileService - profile pages, edits, renames and image uploads

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::storage::{file_extension, ObjectStore, AVATARS_BUCKET, BANNERS_BUCKET};
use crate::infrastructure::viewer::ViewerContext;
use crate::models::profile::MAX_BIO_CHARS;
use crate::models::{Edge, EdgeKind, Profile, ProfileUpdate, ProfileWithCounts};

static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("Invalid username regex"));

pub const MIN_USERNAME_CHARS: usize = 3;

pub fn validate_username(username: &str) -> AppResult<()> {
    if username.chars().count() < MIN_USERNAME_CHARS {
        return Err(AppError::Validation(format!(
            "Username must be at least {} characters",
            MIN_USERNAME_CHARS
        )));
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(AppError::Validation(
            "Username may only contain letters, numbers and underscores".to_string(),
        ));
    }
    Ok(())
}

/// Editable presentation fields
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileEdit {
    pub display_name: Option<String>,
    pub bio: Option<String>,
}

/// Which profile image an upload replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileImage {
    Avatar,
    Banner,
}

impl ProfileImage {
    fn bucket(&self) -> &'static str {
        match self {
            ProfileImage::Avatar => AVATARS_BUCKET,
            ProfileImage::Banner => BANNERS_BUCKET,
        }
    }

    fn object_name(&self) -> &'static str {
        match self {
            ProfileImage::Avatar => "avatar",
            ProfileImage::Banner => "banner",
        }
    }
}

#[derive(Clone)]
pub struct ProfileService {
    db: Arc<dyn DatabaseInterface>,
    storage: Arc<dyn ObjectStore>,
}

impl ProfileService {
    pub fn new(db: Arc<dyn DatabaseInterface>, storage: Arc<dyn ObjectStore>) -> Self {
        Self { db, storage }
    }

    /// Profile page data: the profile, its counts, and whether the viewer follows it
    pub async fn get_by_username(&self, username: &str, viewer_id: Option<Uuid>) -> AppResult<ProfileWithCounts> {
        let profile = self
            .db
            .get_profile_by_username(username)
            .await
            .map_err(AppError::into_query)?
            .ok_or_else(|| AppError::NotFound(format!("Profile @{} not found", username)))?;
        let id = profile.id;

        let is_following = async {
            match viewer_id {
                Some(viewer) if viewer != id => self.db.edge_exists(Edge::follow(viewer, id)).await,
                _ => Ok(false),
            }
        };

        let (follower_count, following_count, post_count, is_following) = futures::try_join!(
            self.db.count_edges_to(EdgeKind::Follow, id),
            self.db.count_edges_from(EdgeKind::Follow, id),
            self.db.count_posts_by_author(id),
            is_following,
        )
        .map_err(AppError::into_query)?;

        Ok(ProfileWithCounts {
            profile,
            follower_count,
            following_count,
            post_count,
            is_following,
        })
    }

    #[instrument(skip(self, vc, edit), fields(user_id = ?vc.user_id))]
    pub async fn update_profile(&self, vc: &ViewerContext, edit: ProfileEdit) -> AppResult<Profile> {
        let user_id = vc.require_user()?;

        if let Some(bio) = &edit.bio {
            if bio.chars().count() > MAX_BIO_CHARS {
                return Err(AppError::Validation(format!(
                    "Bio is limited to {} characters",
                    MAX_BIO_CHARS
                )));
            }
        }
        let display_name = edit.display_name.map(|name| name.trim().to_string());
        if display_name.as_deref().is_some_and(str::is_empty) {
            return Err(AppError::Validation("Display name cannot be empty".to_string()));
        }

        let update = ProfileUpdate {
            display_name,
            bio: edit.bio,
            ..Default::default()
        };
        self.apply(user_id, &update).await
    }

    /// Rename the viewer. The new handle must be well-formed and unused.
    #[instrument(skip(self, vc), fields(user_id = ?vc.user_id))]
    pub async fn change_username(&self, vc: &ViewerContext, username: &str) -> AppResult<Profile> {
        let user_id = vc.require_user()?;
        let username = username.trim();
        validate_username(username)?;

        if let Some(existing) = self
            .db
            .get_profile_by_username(username)
            .await
            .map_err(AppError::into_mutation)?
        {
            if existing.id == user_id {
                return Ok(existing);
            }
            return Err(AppError::Conflict(format!("Username {} is already taken", username)));
        }

        let profile = self
            .apply(
                user_id,
                &ProfileUpdate {
                    username: Some(username.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        info!(username = %profile.username, "username changed");
        Ok(profile)
    }

    /// Replace the viewer's avatar or banner. The stored URL carries a `?t=` suffix
    /// so clients refetch the overwritten object.
    pub async fn upload_image(
        &self,
        vc: &ViewerContext,
        image: ProfileImage,
        file_name: &str,
        bytes: &[u8],
    ) -> AppResult<Profile> {
        let user_id = vc.require_user()?;
        let bucket = image.bucket();
        let path = format!("{}/{}.{}", user_id, image.object_name(), file_extension(file_name));

        self.storage.upload(bucket, &path, bytes, true).await?;
        let url = format!(
            "{}?t={}",
            self.storage.public_url(bucket, &path),
            Utc::now().timestamp_millis()
        );

        let update = match image {
            ProfileImage::Avatar => ProfileUpdate {
                avatar_url: Some(url),
                ..Default::default()
            },
            ProfileImage::Banner => ProfileUpdate {
                banner_url: Some(url),
                ..Default::default()
            },
        };
        self.apply(user_id, &update).await
    }

    async fn apply(&self, user_id: Uuid, update: &ProfileUpdate) -> AppResult<Profile> {
        if update.is_empty() {
            return self
                .db
                .get_profile(user_id)
                .await
                .map_err(AppError::into_query)?
                .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)));
        }
        self.db
            .update_profile(user_id, update)
            .await
            .map_err(AppError::into_mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("ada_99").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("dash-name").is_err());
    }
}
