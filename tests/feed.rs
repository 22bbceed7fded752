use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;
use xcion::{
    feed::{decode_cursor, CountCache, FeedRequest, FeedService, PAGE_SIZE},
    infrastructure::{database::DatabaseInterface, database::PostKey, sqlite_database::SqliteDatabase},
    models::{Edge, FeedType, NewPost, Profile},
};

struct World {
    db: Arc<SqliteDatabase>,
    feed: FeedService,
}

async fn world() -> World {
    let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
    let feed = FeedService::new(db.clone(), Arc::new(CountCache::new(256)));
    World { db, feed }
}

async fn profile(db: &SqliteDatabase, username: &str) -> Profile {
    let profile = Profile::new(Uuid::new_v4(), username, username);
    db.create_profile(&profile).await.unwrap();
    profile
}

fn new_post(author: Uuid) -> NewPost {
    NewPost {
        author_id: author,
        content: "hello".to_string(),
        media_urls: vec![],
        parent_id: None,
        repost_of: None,
    }
}

async fn insert(db: &SqliteDatabase, post: NewPost) -> Uuid {
    db.insert_post(&post).await.unwrap().post.id
}

#[tokio::test]
async fn pagination_walks_every_post_once_despite_equal_timestamps() {
    let w = world().await;
    let alice = profile(&w.db, "alice").await;
    let mut expected = HashSet::new();
    for _ in 0..45 {
        expected.insert(insert(&w.db, new_post(alice.id)).await);
    }
    // Two timestamp buckets that straddle page boundaries
    sqlx::query("UPDATE posts SET created_at = 5000 WHERE rowid % 2 = 0")
        .execute(w.db.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE posts SET created_at = 4000 WHERE rowid % 2 = 1")
        .execute(w.db.pool())
        .await
        .unwrap();

    let mut seen = HashSet::new();
    let mut cursor = None;
    let mut pages = 0;
    loop {
        let request = FeedRequest::new(FeedType::Explore).cursor(cursor.clone());
        let page = w.feed.fetch_posts(&request, None).await.unwrap();
        pages += 1;
        assert!(page.data.len() <= PAGE_SIZE);
        assert_eq!(page.next_cursor.is_some(), page.data.len() == PAGE_SIZE);

        if let Some(token) = &cursor {
            let bound = decode_cursor(token).unwrap();
            for post in &page.data {
                assert!(PostKey::of(&post.post) < bound);
            }
        }
        for post in &page.data {
            assert!(seen.insert(post.post.id), "duplicate across pages");
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn exact_multiple_of_page_size_ends_with_empty_page() {
    let w = world().await;
    let alice = profile(&w.db, "alice").await;
    for _ in 0..PAGE_SIZE {
        insert(&w.db, new_post(alice.id)).await;
    }

    let first = w
        .feed
        .fetch_posts(&FeedRequest::new(FeedType::Explore), None)
        .await
        .unwrap();
    assert_eq!(first.data.len(), PAGE_SIZE);

    let second = w
        .feed
        .fetch_posts(&FeedRequest::new(FeedType::Explore).cursor(first.next_cursor), None)
        .await
        .unwrap();
    assert!(second.data.is_empty());
    assert_eq!(second.next_cursor, None);
}

#[tokio::test]
async fn reposts_are_counted_but_never_listed() {
    let w = world().await;
    let alice = profile(&w.db, "alice").await;
    let bob = profile(&w.db, "bob").await;
    let original = insert(&w.db, new_post(alice.id)).await;
    let mut repost = new_post(bob.id);
    repost.repost_of = Some(original);
    let repost_id = insert(&w.db, repost).await;
    w.db.create_edge(Edge::bookmark(bob.id, repost_id)).await.unwrap();

    for request in [
        FeedRequest::new(FeedType::Explore),
        FeedRequest::new(FeedType::Home),
        FeedRequest::new(FeedType::User).user(bob.id),
        FeedRequest::new(FeedType::Bookmarks),
    ] {
        let page = w.feed.fetch_posts(&request, Some(bob.id)).await.unwrap();
        assert!(
            page.data.iter().all(|p| p.post.repost_of.is_none()),
            "{} listed a repost",
            request.feed_type
        );
    }

    let explore = w
        .feed
        .fetch_posts(&FeedRequest::new(FeedType::Explore), None)
        .await
        .unwrap();
    assert_eq!(explore.data.len(), 1);
    assert_eq!(explore.data[0].repost_count, 1);
    assert!(!explore.data[0].is_reposted);
}

#[tokio::test]
async fn viewer_flags_follow_joined_rows() {
    let w = world().await;
    let alice = profile(&w.db, "alice").await;
    let bob = profile(&w.db, "bob").await;
    let post_id = insert(&w.db, new_post(alice.id)).await;
    w.db.create_edge(Edge::like(bob.id, post_id)).await.unwrap();
    w.db.create_edge(Edge::like(alice.id, post_id)).await.unwrap();
    w.db.create_edge(Edge::bookmark(bob.id, post_id)).await.unwrap();

    let as_bob = w.feed.get_post(post_id, Some(bob.id)).await.unwrap();
    assert_eq!(as_bob.like_count, 2);
    assert!(as_bob.is_liked && as_bob.is_bookmarked);

    let as_alice = w.feed.get_post(post_id, Some(alice.id)).await.unwrap();
    assert!(as_alice.is_liked && !as_alice.is_bookmarked);

    let anonymous = w.feed.get_post(post_id, None).await.unwrap();
    assert!(!anonymous.is_liked && !anonymous.is_bookmarked);
    assert_eq!(anonymous.author.username, "alice");
}

#[tokio::test]
async fn likes_feed_includes_replies_bookmarks_do_not() {
    let w = world().await;
    let alice = profile(&w.db, "alice").await;
    let root = insert(&w.db, new_post(alice.id)).await;
    let mut reply = new_post(alice.id);
    reply.parent_id = Some(root);
    let reply_id = insert(&w.db, reply).await;

    for id in [root, reply_id] {
        w.db.create_edge(Edge::like(alice.id, id)).await.unwrap();
        w.db.create_edge(Edge::bookmark(alice.id, id)).await.unwrap();
    }

    let likes = w
        .feed
        .fetch_posts(&FeedRequest::new(FeedType::Likes).user(alice.id), None)
        .await
        .unwrap();
    assert_eq!(likes.data.len(), 2);

    let bookmarks = w
        .feed
        .fetch_posts(&FeedRequest::new(FeedType::Bookmarks), Some(alice.id))
        .await
        .unwrap();
    assert_eq!(bookmarks.data.len(), 1);
    assert_eq!(bookmarks.data[0].post.id, root);
    assert_eq!(bookmarks.data[0].reply_count, 1);

    let replies = w
        .feed
        .fetch_posts(&FeedRequest::new(FeedType::Replies).user(alice.id), None)
        .await
        .unwrap();
    assert_eq!(replies.data.len(), 1);
    assert_eq!(replies.data[0].post.id, reply_id);
}

#[tokio::test]
async fn anonymous_home_falls_back_to_explore() {
    let w = world().await;
    let alice = profile(&w.db, "alice").await;
    insert(&w.db, new_post(alice.id)).await;

    let home = w.feed.fetch_posts(&FeedRequest::new(FeedType::Home), None).await.unwrap();
    assert_eq!(home.data.len(), 1);
}

#[tokio::test]
async fn malformed_cursor_is_a_validation_error() {
    let w = world().await;
    let request = FeedRequest::new(FeedType::Explore).cursor(Some("not a cursor".to_string()));
    let err = w.feed.fetch_with_retry(&request, None).await.unwrap_err();
    assert!(matches!(err, xcion::AppError::Validation(_)));
}
