// SearchService - substring search over profiles and post content

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::feed::FeedService;
use crate::infrastructure::database::{DatabaseInterface, PostQuery};
use crate::models::{PostWithCounts, Profile};

pub const SEARCH_LIMIT: usize = 20;

#[derive(Clone)]
pub struct SearchService {
    db: Arc<dyn DatabaseInterface>,
    feed: Arc<FeedService>,
}

impl SearchService {
    pub fn new(db: Arc<dyn DatabaseInterface>, feed: Arc<FeedService>) -> Self {
        Self { db, feed }
    }

    /// Case-insensitive match on username or display name. Blank queries match nothing.
    pub async fn search_profiles(&self, query: &str) -> AppResult<Vec<Profile>> {
        let needle = query.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        debug!(needle, "searching profiles");

        self.db
            .search_profiles(needle, SEARCH_LIMIT)
            .await
            .map_err(AppError::into_query)
    }

    /// Newest posts whose content contains the query, with the same counts and flags as feeds
    pub async fn search_posts(&self, query: &str, viewer_id: Option<Uuid>) -> AppResult<Vec<PostWithCounts>> {
        let needle = query.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        debug!(needle, "searching posts");

        let rows = self
            .db
            .query_posts(&PostQuery::new(SEARCH_LIMIT).content_contains(needle))
            .await
            .map_err(AppError::into_query)?;
        self.feed.decorate(rows, viewer_id).await
    }
}
