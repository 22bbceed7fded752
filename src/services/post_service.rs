// PostService - authoring, editing and deleting posts plus media uploads

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::feed::CountCache;
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::security::Capability;
use crate::infrastructure::storage::{file_extension, ObjectStore, POST_MEDIA_BUCKET};
use crate::infrastructure::viewer::ViewerContext;
use crate::models::post::{MAX_MEDIA_PER_POST, MAX_POST_CHARS};
use crate::models::{NewPost, Post, PostWithCounts};

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct PostDraft {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub parent_id: Option<Uuid>,
}

pub fn validate_content(content: &str) -> AppResult<()> {
    let chars = content.chars().count();
    if chars > MAX_POST_CHARS {
        return Err(AppError::Validation(format!(
            "Post is {} characters, the limit is {}",
            chars, MAX_POST_CHARS
        )));
    }
    Ok(())
}

pub fn validate_draft(draft: &PostDraft) -> AppResult<()> {
    validate_content(&draft.content)?;
    if draft.media_urls.len() > MAX_MEDIA_PER_POST {
        return Err(AppError::Validation(format!(
            "At most {} media attachments per post",
            MAX_MEDIA_PER_POST
        )));
    }
    if draft.content.trim().is_empty() && draft.media_urls.is_empty() {
        return Err(AppError::Validation("Post needs text or media".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct PostService {
    db: Arc<dyn DatabaseInterface>,
    counts: Arc<CountCache>,
    storage: Arc<dyn ObjectStore>,
}

impl PostService {
    pub fn new(
        db: Arc<dyn DatabaseInterface>,
        counts: Arc<CountCache>,
        storage: Arc<dyn ObjectStore>,
    ) -> Self {
        Self { db, counts, storage }
    }

    #[instrument(skip(self, vc, draft), fields(user_id = ?vc.user_id, reply = draft.parent_id.is_some()))]
    pub async fn create_post(&self, vc: &ViewerContext, draft: PostDraft) -> AppResult<PostWithCounts> {
        let author_id = vc.require_user()?;
        validate_draft(&draft)?;

        if let Some(parent_id) = draft.parent_id {
            self.db
                .get_post(parent_id)
                .await
                .map_err(AppError::into_mutation)?
                .ok_or_else(|| AppError::NotFound(format!("Parent post {} not found", parent_id)))?;
        }

        let row = self
            .db
            .insert_post(&NewPost {
                author_id,
                content: draft.content,
                media_urls: draft.media_urls,
                parent_id: draft.parent_id,
                repost_of: None,
            })
            .await
            .map_err(AppError::into_mutation)?;

        self.counts.invalidate_post(&row.post).await;
        info!(post_id = %row.post.id, "post created");

        Ok(PostWithCounts::from_row(row, Some(author_id), 0, 0))
    }

    /// Edit the body of one's own post
    pub async fn update_post(&self, vc: &ViewerContext, post_id: Uuid, content: &str) -> AppResult<Post> {
        let user_id = vc.require_user()?;
        validate_content(content)?;
        let existing = self.load(post_id).await?;

        if existing.author_id != user_id {
            return Err(AppError::Forbidden("Only the author can edit a post".to_string()));
        }
        if content.trim().is_empty() && existing.media_urls.is_empty() {
            return Err(AppError::Validation("Post needs text or media".to_string()));
        }

        self.db
            .update_post_content(post_id, content)
            .await
            .map_err(AppError::into_mutation)
    }

    /// Delete a post. Authors may delete their own; admins may delete any.
    #[instrument(skip(self, vc), fields(user_id = ?vc.user_id))]
    pub async fn delete_post(&self, vc: &ViewerContext, post_id: Uuid) -> AppResult<()> {
        let user_id = vc.require_user()?;
        let existing = self.load(post_id).await?;

        if existing.author_id != user_id && !vc.can(Capability::DeleteAnyPost) {
            return Err(AppError::Forbidden("Cannot delete another user's post".to_string()));
        }

        let deleted = self
            .db
            .delete_post(post_id)
            .await
            .map_err(AppError::into_mutation)?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;

        self.counts.invalidate_post(&deleted).await;
        info!(%post_id, "post deleted");
        Ok(())
    }

    /// Store an attachment under the uploader's folder and return its public URL
    pub async fn upload_media(&self, vc: &ViewerContext, file_name: &str, bytes: &[u8]) -> AppResult<String> {
        let user_id = vc.require_user()?;
        let path = media_object_path(user_id, file_name);

        self.storage
            .upload(POST_MEDIA_BUCKET, &path, bytes, false)
            .await?;
        Ok(self.storage.public_url(POST_MEDIA_BUCKET, &path))
    }

    async fn load(&self, post_id: Uuid) -> AppResult<Post> {
        self.db
            .get_post(post_id)
            .await
            .map_err(AppError::into_mutation)?
            .map(|row| row.post)
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))
    }
}

/// `{user}/{millis}-{random}.{ext}` inside the post-media bucket
pub fn media_object_path(user_id: Uuid, file_name: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!(
        "{}/{}-{}.{}",
        user_id,
        Utc::now().timestamp_millis(),
        suffix,
        file_extension(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(content: &str, media: usize) -> PostDraft {
        PostDraft {
            content: content.to_string(),
            media_urls: (0..media).map(|i| format!("http://m/{}", i)).collect(),
            parent_id: None,
        }
    }

    #[test]
    fn draft_limits() {
        assert!(validate_draft(&draft("hi", 0)).is_ok());
        assert!(validate_draft(&draft("", 1)).is_ok());
        assert!(validate_draft(&draft(&"x".repeat(280), 4)).is_ok());
        assert!(validate_draft(&draft(&"x".repeat(281), 0)).is_err());
        assert!(validate_draft(&draft("hi", 5)).is_err());
        assert!(validate_draft(&draft("   ", 0)).is_err());
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        assert!(validate_content(&"é".repeat(280)).is_ok());
    }

    #[test]
    fn media_paths_live_under_the_uploader() {
        let user = Uuid::new_v4();
        let path = media_object_path(user, "Cat.PNG");
        assert!(path.starts_with(&format!("{}/", user)));
        assert!(path.ends_with(".png"));
        assert_ne!(path, media_object_path(user, "Cat.PNG"));
    }
}
