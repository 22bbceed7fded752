use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::profile::Profile;
use crate::error::AppError;

pub const MAX_POST_CHARS: usize = 280;
pub const MAX_MEDIA_PER_POST: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub media_urls: Vec<String>,
    pub parent_id: Option<Uuid>,
    pub repost_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload. Id and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub author_id: Uuid,
    pub content: String,
    pub media_urls: Vec<String>,
    pub parent_id: Option<Uuid>,
    pub repost_of: Option<Uuid>,
}

/// A post as read from the store together with its nested lookups:
/// the author row and the user ids of its like and bookmark rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRow {
    pub post: Post,
    pub author: Profile,
    pub liked_by: Vec<Uuid>,
    pub bookmarked_by: Vec<Uuid>,
}

/// Denormalized, viewer-relative post. Computed per fetch, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostWithCounts {
    #[serde(flatten)]
    pub post: Post,
    pub author: Profile,
    pub like_count: u64,
    pub reply_count: u64,
    pub repost_count: u64,
    pub is_liked: bool,
    pub is_bookmarked: bool,
    pub is_reposted: bool,
}

impl PostWithCounts {
    pub fn from_row(row: PostRow, viewer_id: Option<Uuid>, reply_count: u64, repost_count: u64) -> Self {
        let is_liked = viewer_id.is_some_and(|v| row.liked_by.contains(&v));
        let is_bookmarked = viewer_id.is_some_and(|v| row.bookmarked_by.contains(&v));

        Self {
            like_count: row.liked_by.len() as u64,
            reply_count,
            repost_count,
            is_liked,
            is_bookmarked,
            // No repost creation path exists
            is_reposted: false,
            post: row.post,
            author: row.author,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Home,
    #[default]
    Explore,
    User,
    Replies,
    Likes,
    Bookmarks,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Home => "home",
            FeedType::Explore => "explore",
            FeedType::User => "user",
            FeedType::Replies => "replies",
            FeedType::Likes => "likes",
            FeedType::Bookmarks => "bookmarks",
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "home" => Ok(FeedType::Home),
            "explore" => Ok(FeedType::Explore),
            "user" => Ok(FeedType::User),
            "replies" => Ok(FeedType::Replies),
            "likes" => Ok(FeedType::Likes),
            "bookmarks" => Ok(FeedType::Bookmarks),
            other => Err(AppError::Validation(format!("Unknown feed type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> PaginatedResponse<T> {
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            next_cursor: None,
        }
    }
}

pub type FeedPage = PaginatedResponse<PostWithCounts>;
