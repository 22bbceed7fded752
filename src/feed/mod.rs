// Feed Assembly - paginated, denormalized post lists scoped by feed type
// Pages are keyset-paginated over (created_at, id) descending, PAGE_SIZE rows each.

pub mod counts;
pub mod cursor;

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{DatabaseInterface, ParentFilter, PostKey, PostQuery};
use crate::models::{EdgeKind, FeedPage, FeedType, PaginatedResponse, PostRow, PostWithCounts};

pub use counts::{CountCache, FanOutCounts};
pub use cursor::{decode_cursor, encode_cursor};

pub const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedRequest {
    #[serde(default)]
    pub feed_type: FeedType,
    pub user_id: Option<Uuid>,
    /// Thread scope: direct children of this post, regardless of feed type
    pub parent_id: Option<Uuid>,
    pub cursor: Option<String>,
}

impl FeedRequest {
    pub fn new(feed_type: FeedType) -> Self {
        Self {
            feed_type,
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn thread(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

pub struct FeedService {
    db: Arc<dyn DatabaseInterface>,
    counts: Arc<CountCache>,
}

impl FeedService {
    pub fn new(db: Arc<dyn DatabaseInterface>, counts: Arc<CountCache>) -> Self {
        Self { db, counts }
    }

    /// One page of the requested feed. Store failures surface as `Query` errors
    /// and no partial page is ever returned.
    #[instrument(skip(self, request), fields(feed_type = %request.feed_type, viewer = ?viewer_id))]
    pub async fn fetch_posts(
        &self,
        request: &FeedRequest,
        viewer_id: Option<Uuid>,
    ) -> AppResult<FeedPage> {
        self.fetch_page(request, viewer_id)
            .await
            .map_err(AppError::into_query)
    }

    /// `fetch_posts` with a single immediate retry on store failure
    pub async fn fetch_with_retry(
        &self,
        request: &FeedRequest,
        viewer_id: Option<Uuid>,
    ) -> AppResult<FeedPage> {
        match self.fetch_posts(request, viewer_id).await {
            Err(AppError::Query(msg)) => {
                warn!(error = %msg, "feed fetch failed, retrying once");
                self.fetch_posts(request, viewer_id).await
            }
            other => other,
        }
    }

    pub async fn get_post(&self, post_id: Uuid, viewer_id: Option<Uuid>) -> AppResult<PostWithCounts> {
        let row = self
            .db
            .get_post(post_id)
            .await
            .map_err(AppError::into_query)?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;

        self.decorate(vec![row], viewer_id)
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal(format!("Post {} lost during decoration", post_id)))
    }

    /// Attach fan-out counts and viewer flags to raw rows, preserving order
    pub async fn decorate(
        &self,
        rows: Vec<PostRow>,
        viewer_id: Option<Uuid>,
    ) -> AppResult<Vec<PostWithCounts>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.post.id).collect();
        let fan_out = self
            .counts
            .fan_out(self.db.as_ref(), &ids)
            .await
            .map_err(AppError::into_query)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.post.id;
                PostWithCounts::from_row(
                    row,
                    viewer_id,
                    fan_out.replies.get(&id).copied().unwrap_or(0),
                    fan_out.reposts.get(&id).copied().unwrap_or(0),
                )
            })
            .collect())
    }

    async fn fetch_page(&self, request: &FeedRequest, viewer_id: Option<Uuid>) -> AppResult<FeedPage> {
        let before = request.cursor.as_deref().map(decode_cursor).transpose()?;

        let Some(query) = self.scoped_query(request, viewer_id).await? else {
            debug!("feed scope is empty");
            return Ok(PaginatedResponse::empty());
        };

        let rows = self.db.query_posts(&query.before(before)).await?;
        let data = self.decorate(rows, viewer_id).await?;

        let next_cursor = if data.len() == PAGE_SIZE {
            data.last().map(|last| encode_cursor(PostKey::of(&last.post)))
        } else {
            None
        };

        Ok(FeedPage { data, next_cursor })
    }

    /// Query for the requested scope, or `None` when the scope is known to be empty
    async fn scoped_query(
        &self,
        request: &FeedRequest,
        viewer_id: Option<Uuid>,
    ) -> AppResult<Option<PostQuery>> {
        let base = PostQuery::new(PAGE_SIZE);

        if let Some(parent_id) = request.parent_id {
            return Ok(Some(base.parent(ParentFilter::ChildrenOf(parent_id))));
        }

        let query = match request.feed_type {
            FeedType::Home => match viewer_id {
                Some(viewer) => {
                    let mut authors = self.db.edge_targets(EdgeKind::Follow, viewer).await?;
                    authors.push(viewer);
                    base.authors(authors).parent(ParentFilter::TopLevel)
                }
                None => base.parent(ParentFilter::TopLevel),
            },
            FeedType::Explore => base.parent(ParentFilter::TopLevel),
            FeedType::User => base
                .authors(vec![required_user(request)?])
                .parent(ParentFilter::TopLevel),
            FeedType::Replies => base
                .authors(vec![required_user(request)?])
                .parent(ParentFilter::RepliesOnly),
            FeedType::Likes => {
                let liked = self
                    .db
                    .edge_targets(EdgeKind::Like, required_user(request)?)
                    .await?;
                if liked.is_empty() {
                    return Ok(None);
                }
                base.ids(liked)
            }
            FeedType::Bookmarks => {
                let viewer = viewer_id.ok_or_else(|| {
                    AppError::Unauthorized("Bookmarks require a signed-in viewer".to_string())
                })?;
                let saved = self.db.edge_targets(EdgeKind::Bookmark, viewer).await?;
                if saved.is_empty() {
                    return Ok(None);
                }
                base.ids(saved).parent(ParentFilter::TopLevel)
            }
        };

        Ok(Some(query))
    }
}

fn required_user(request: &FeedRequest) -> AppResult<Uuid> {
    request.user_id.ok_or_else(|| {
        AppError::Validation(format!("{} feed requires a user_id", request.feed_type))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::sqlite_database::SqliteDatabase;
    use crate::infrastructure::test_support::InterceptingDatabase;
    use crate::models::{Edge, NewPost, Profile};

    struct Fixture {
        db: Arc<SqliteDatabase>,
        feed: FeedService,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let feed = FeedService::new(db.clone(), Arc::new(CountCache::new(64)));
        Fixture { db, feed }
    }

    async fn profile(db: &SqliteDatabase, username: &str) -> Profile {
        let profile = Profile::new(Uuid::new_v4(), username, username);
        db.create_profile(&profile).await.unwrap();
        profile
    }

    async fn post(db: &SqliteDatabase, author: Uuid, parent: Option<Uuid>) -> Uuid {
        db.insert_post(&NewPost {
            author_id: author,
            content: "post".to_string(),
            media_urls: vec![],
            parent_id: parent,
            repost_of: None,
        })
        .await
        .unwrap()
        .post
        .id
    }

    #[tokio::test]
    async fn scoped_feeds_require_user_id() {
        let f = fixture().await;
        for feed_type in [FeedType::User, FeedType::Replies, FeedType::Likes] {
            let err = f.feed.fetch_posts(&FeedRequest::new(feed_type), None).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{}", feed_type);
        }
    }

    #[tokio::test]
    async fn bookmarks_require_viewer() {
        let f = fixture().await;
        let err = f
            .feed
            .fetch_posts(&FeedRequest::new(FeedType::Bookmarks), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn empty_like_set_short_circuits() {
        let f = fixture().await;
        let alice = profile(&f.db, "alice").await;
        post(&f.db, alice.id, None).await;

        let page = f
            .feed
            .fetch_posts(&FeedRequest::new(FeedType::Likes).user(alice.id), None)
            .await
            .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn home_includes_self_and_followed_only() {
        let f = fixture().await;
        let alice = profile(&f.db, "alice").await;
        let bob = profile(&f.db, "bob").await;
        let carol = profile(&f.db, "carol").await;
        f.db.create_edge(Edge::follow(alice.id, bob.id)).await.unwrap();

        let own = post(&f.db, alice.id, None).await;
        let followed = post(&f.db, bob.id, None).await;
        post(&f.db, carol.id, None).await;
        post(&f.db, bob.id, Some(followed)).await;

        let page = f
            .feed
            .fetch_posts(&FeedRequest::new(FeedType::Home), Some(alice.id))
            .await
            .unwrap();
        let mut ids: Vec<Uuid> = page.data.iter().map(|p| p.post.id).collect();
        ids.sort();
        let mut expected = vec![own, followed];
        expected.sort();
        assert_eq!(ids, expected);

        let followed_post = page.data.iter().find(|p| p.post.id == followed).unwrap();
        assert_eq!(followed_post.reply_count, 1);
    }

    #[tokio::test]
    async fn thread_mode_overrides_feed_type() {
        let f = fixture().await;
        let alice = profile(&f.db, "alice").await;
        let root = post(&f.db, alice.id, None).await;
        let child = post(&f.db, alice.id, Some(root)).await;

        let page = f
            .feed
            .fetch_posts(&FeedRequest::new(FeedType::Bookmarks).thread(root), None)
            .await
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].post.id, child);
    }

    #[tokio::test]
    async fn get_post_reports_missing_rows() {
        let f = fixture().await;
        let err = f.feed.get_post(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    async fn intercepted() -> (Arc<SqliteDatabase>, Arc<InterceptingDatabase>, FeedService) {
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let store = Arc::new(InterceptingDatabase::new(db.clone()));
        let feed = FeedService::new(store.clone(), Arc::new(CountCache::new(64)));
        (db, store, feed)
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_query_error() {
        let (db, store, feed) = intercepted().await;
        let alice = profile(&db, "alice").await;
        post(&db, alice.id, None).await;
        store.fail_queries(1);

        let err = feed
            .fetch_posts(&FeedRequest::new(FeedType::Explore), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Query(_)), "{:?}", err);
        assert_eq!(store.query_calls(), 1);
    }

    #[tokio::test]
    async fn retry_recovers_from_one_failure() {
        let (db, store, feed) = intercepted().await;
        let alice = profile(&db, "alice").await;
        let id = post(&db, alice.id, None).await;
        store.fail_queries(1);

        let page = feed
            .fetch_with_retry(&FeedRequest::new(FeedType::Explore), None)
            .await
            .unwrap();
        assert_eq!(store.query_calls(), 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].post.id, id);
    }

    #[tokio::test]
    async fn retry_gives_up_after_second_failure() {
        let (db, store, feed) = intercepted().await;
        let alice = profile(&db, "alice").await;
        post(&db, alice.id, None).await;
        store.fail_queries(5);

        let err = feed
            .fetch_with_retry(&FeedRequest::new(FeedType::Explore), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Query(_)), "{:?}", err);
        assert_eq!(store.query_calls(), 2);
    }
}
