// Database Interface - the relational store behind profiles, posts and association edges
// Every persistence operation goes through this trait; rows come back already joined.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Edge, EdgeKind, NewPost, Post, PostRow, Profile, ProfileUpdate};

/// Keyset position of a post: creation time with the id as unique tiebreaker.
/// Ordering is (created_at, id) descending throughout the read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostKey {
    pub created_at: i64,
    pub id: Uuid,
}

impl PostKey {
    pub fn of(post: &Post) -> Self {
        Self {
            created_at: post.created_at.timestamp_millis(),
            id: post.id,
        }
    }
}

/// Restriction on `parent_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentFilter {
    #[default]
    Any,
    TopLevel,
    RepliesOnly,
    ChildrenOf(Uuid),
}

/// Post read query. Filters combine with AND.
#[derive(Debug, Clone, PartialEq)]
pub struct PostQuery {
    pub ids: Option<Vec<Uuid>>,
    pub authors: Option<Vec<Uuid>>,
    pub parent: ParentFilter,
    /// Case-insensitive substring match on content
    pub content_contains: Option<String>,
    pub include_reposts: bool,
    pub before: Option<PostKey>,
    pub limit: usize,
}

impl PostQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            ids: None,
            authors: None,
            parent: ParentFilter::Any,
            content_contains: None,
            include_reposts: false,
            before: None,
            limit,
        }
    }

    pub fn ids(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn authors(mut self, authors: Vec<Uuid>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn parent(mut self, parent: ParentFilter) -> Self {
        self.parent = parent;
        self
    }

    pub fn content_contains(mut self, needle: impl Into<String>) -> Self {
        self.content_contains = Some(needle.into());
        self
    }

    pub fn before(mut self, key: Option<PostKey>) -> Self {
        self.before = key;
        self
    }
}

/// Foreign key of `posts` that fan-out counts are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountColumn {
    Parent,
    RepostOf,
}

impl CountColumn {
    pub fn column(&self) -> &'static str {
        match self {
            CountColumn::Parent => "parent_id",
            CountColumn::RepostOf => "repost_of",
        }
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside a LIKE pattern.
pub fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
pub trait DatabaseInterface: Send + Sync {
    // Profile operations
    async fn get_profile(&self, id: Uuid) -> AppResult<Option<Profile>>;
    async fn get_profile_by_username(&self, username: &str) -> AppResult<Option<Profile>>;
    async fn create_profile(&self, profile: &Profile) -> AppResult<()>;
    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> AppResult<Profile>;
    /// All profiles, oldest first
    async fn list_profiles(&self) -> AppResult<Vec<Profile>>;
    async fn search_profiles(&self, needle: &str, limit: usize) -> AppResult<Vec<Profile>>;

    // Post operations
    async fn get_post(&self, id: Uuid) -> AppResult<Option<PostRow>>;
    async fn query_posts(&self, query: &PostQuery) -> AppResult<Vec<PostRow>>;
    async fn insert_post(&self, post: &NewPost) -> AppResult<PostRow>;
    async fn update_post_content(&self, id: Uuid, content: &str) -> AppResult<Post>;
    /// Returns the deleted row, or `None` when nothing matched
    async fn delete_post(&self, id: Uuid) -> AppResult<Option<Post>>;
    async fn count_posts_grouped(
        &self,
        column: CountColumn,
        ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, u64>>;
    async fn count_posts_by_author(&self, author_id: Uuid) -> AppResult<u64>;

    // Association edge operations
    /// Returns false when the edge already existed
    async fn create_edge(&self, edge: Edge) -> AppResult<bool>;
    async fn delete_edge(&self, edge: Edge) -> AppResult<bool>;
    async fn edge_exists(&self, edge: Edge) -> AppResult<bool>;
    /// Targets of all edges of `kind` leaving `source`, newest first
    async fn edge_targets(&self, kind: EdgeKind, source: Uuid) -> AppResult<Vec<Uuid>>;
    async fn count_edges_from(&self, kind: EdgeKind, source: Uuid) -> AppResult<u64>;
    async fn count_edges_to(&self, kind: EdgeKind, target: Uuid) -> AppResult<u64>;
}

/// Single-row profile lookup, the only store access the session state needs.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn post_keys_order_by_time_then_id() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let a = PostKey { created_at: 10, id: high };
        let b = PostKey { created_at: 10, id: low };
        let c = PostKey { created_at: 11, id: low };
        assert!(b < a);
        assert!(a < c);
    }
}
