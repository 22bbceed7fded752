// Test double over SqliteDatabase that can fail post reads and run a write mid-count

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{CountColumn, DatabaseInterface, PostQuery};
use crate::infrastructure::sqlite_database::SqliteDatabase;
use crate::models::{Edge, EdgeKind, NewPost, Post, PostRow, Profile, ProfileUpdate};

pub struct InterceptingDatabase {
    inner: Arc<SqliteDatabase>,
    query_failures: AtomicUsize,
    query_calls: AtomicUsize,
    after_count: Mutex<Option<BoxFuture<'static, ()>>>,
}

impl InterceptingDatabase {
    pub fn new(inner: Arc<SqliteDatabase>) -> Self {
        Self {
            inner,
            query_failures: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            after_count: Mutex::new(None),
        }
    }

    /// Fail the next `n` calls to `query_posts`
    pub fn fail_queries(&self, n: usize) {
        self.query_failures.store(n, Ordering::SeqCst);
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Run `hook` once, after the next grouped count has read the store
    pub fn after_next_count(&self, hook: BoxFuture<'static, ()>) {
        *self.after_count.lock().unwrap() = Some(hook);
    }
}

#[async_trait]
impl DatabaseInterface for InterceptingDatabase {
    async fn get_profile(&self, id: Uuid) -> AppResult<Option<Profile>> {
        self.inner.get_profile(id).await
    }

    async fn get_profile_by_username(&self, username: &str) -> AppResult<Option<Profile>> {
        self.inner.get_profile_by_username(username).await
    }

    async fn create_profile(&self, profile: &Profile) -> AppResult<()> {
        self.inner.create_profile(profile).await
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> AppResult<Profile> {
        self.inner.update_profile(id, update).await
    }

    async fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        self.inner.list_profiles().await
    }

    async fn search_profiles(&self, needle: &str, limit: usize) -> AppResult<Vec<Profile>> {
        self.inner.search_profiles(needle, limit).await
    }

    async fn get_post(&self, id: Uuid) -> AppResult<Option<PostRow>> {
        self.inner.get_post(id).await
    }

    async fn query_posts(&self, query: &PostQuery) -> AppResult<Vec<PostRow>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .query_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::Database("connection reset".to_string()));
        }
        self.inner.query_posts(query).await
    }

    async fn insert_post(&self, post: &NewPost) -> AppResult<PostRow> {
        self.inner.insert_post(post).await
    }

    async fn update_post_content(&self, id: Uuid, content: &str) -> AppResult<Post> {
        self.inner.update_post_content(id, content).await
    }

    async fn delete_post(&self, id: Uuid) -> AppResult<Option<Post>> {
        self.inner.delete_post(id).await
    }

    async fn count_posts_grouped(
        &self,
        column: CountColumn,
        ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, u64>> {
        let counts = self.inner.count_posts_grouped(column, ids).await?;
        let hook = self.after_count.lock().unwrap().take();
        if let Some(hook) = hook {
            hook.await;
        }
        Ok(counts)
    }

    async fn count_posts_by_author(&self, author_id: Uuid) -> AppResult<u64> {
        self.inner.count_posts_by_author(author_id).await
    }

    async fn create_edge(&self, edge: Edge) -> AppResult<bool> {
        self.inner.create_edge(edge).await
    }

    async fn delete_edge(&self, edge: Edge) -> AppResult<bool> {
        self.inner.delete_edge(edge).await
    }

    async fn edge_exists(&self, edge: Edge) -> AppResult<bool> {
        self.inner.edge_exists(edge).await
    }

    async fn edge_targets(&self, kind: EdgeKind, source: Uuid) -> AppResult<Vec<Uuid>> {
        self.inner.edge_targets(kind, source).await
    }

    async fn count_edges_from(&self, kind: EdgeKind, source: Uuid) -> AppResult<u64> {
        self.inner.count_edges_from(kind, source).await
    }

    async fn count_edges_to(&self, kind: EdgeKind, target: Uuid) -> AppResult<u64> {
        self.inner.count_edges_to(kind, target).await
    }
}
