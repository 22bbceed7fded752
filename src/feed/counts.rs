// Fan-out counts - reply and repost totals per post behind a read-through LRU

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppResult;
use crate::infrastructure::cache::Cache;
use crate::infrastructure::database::{CountColumn, DatabaseInterface};
use crate::models::Post;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanOutCounts {
    pub replies: HashMap<Uuid, u64>,
    pub reposts: HashMap<Uuid, u64>,
}

struct Entries {
    cache: Cache<(CountColumn, Uuid), u64>,
    /// Bumped by every invalidation. A fill started under an older epoch is not stored.
    epoch: u64,
}

/// Counts keyed by (column, target post). Misses are fetched in one grouped query per column.
pub struct CountCache {
    entries: Mutex<Entries>,
}

impl CountCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                cache: Cache::new(capacity),
                epoch: 0,
            }),
        }
    }

    pub async fn fan_out(&self, db: &dyn DatabaseInterface, ids: &[Uuid]) -> AppResult<FanOutCounts> {
        let (replies, reposts) = futures::try_join!(
            self.counts(db, CountColumn::Parent, ids),
            self.counts(db, CountColumn::RepostOf, ids),
        )?;
        Ok(FanOutCounts { replies, reposts })
    }

    pub async fn counts(
        &self,
        db: &dyn DatabaseInterface,
        column: CountColumn,
        ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, u64>> {
        let mut found = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        let started = {
            let mut entries = self.entries.lock().await;
            for id in ids {
                match entries.cache.get(&(column, *id)) {
                    Some(n) => {
                        found.insert(*id, *n);
                    }
                    None => missing.push(*id),
                }
            }
            entries.epoch
        };

        if missing.is_empty() {
            return Ok(found);
        }

        debug!(column = column.column(), misses = missing.len(), "count cache miss");
        let fetched = db.count_posts_grouped(column, &missing).await?;

        let mut entries = self.entries.lock().await;
        let store = entries.epoch == started;
        if !store {
            debug!(column = column.column(), "posts changed during count read, not caching");
        }
        for id in missing {
            let n = fetched.get(&id).copied().unwrap_or(0);
            if store {
                entries.cache.insert((column, id), n);
            }
            found.insert(id, n);
        }
        Ok(found)
    }

    /// Drop every entry a created or deleted post can affect
    pub async fn invalidate_post(&self, post: &Post) {
        let mut entries = self.entries.lock().await;
        entries.epoch += 1;
        entries.cache.remove(&(CountColumn::Parent, post.id));
        entries.cache.remove(&(CountColumn::RepostOf, post.id));
        if let Some(parent_id) = post.parent_id {
            entries.cache.remove(&(CountColumn::Parent, parent_id));
        }
        if let Some(original) = post.repost_of {
            entries.cache.remove(&(CountColumn::RepostOf, original));
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::sqlite_database::SqliteDatabase;
    use crate::infrastructure::test_support::InterceptingDatabase;
    use crate::models::{NewPost, Profile};
    use std::sync::Arc;

    fn reply(author: Uuid, parent: Uuid) -> NewPost {
        NewPost {
            author_id: author,
            content: "reply".to_string(),
            media_urls: vec![],
            parent_id: Some(parent),
            repost_of: None,
        }
    }

    #[tokio::test]
    async fn cached_counts_refresh_after_invalidation() {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let alice = Profile::new(Uuid::new_v4(), "alice", "Alice");
        db.create_profile(&alice).await.unwrap();
        let root = db
            .insert_post(&NewPost {
                author_id: alice.id,
                content: "root".to_string(),
                media_urls: vec![],
                parent_id: None,
                repost_of: None,
            })
            .await
            .unwrap()
            .post;

        let cache = CountCache::new(16);
        let counts = cache.fan_out(&db, &[root.id]).await.unwrap();
        assert_eq!(counts.replies.get(&root.id), Some(&0));
        assert_eq!(counts.reposts.get(&root.id), Some(&0));
        assert_eq!(cache.len().await, 2);

        let child = db.insert_post(&reply(alice.id, root.id)).await.unwrap().post;
        // Stale until the write path invalidates
        let stale = cache.counts(&db, CountColumn::Parent, &[root.id]).await.unwrap();
        assert_eq!(stale.get(&root.id), Some(&0));

        cache.invalidate_post(&child).await;
        let fresh = cache.counts(&db, CountColumn::Parent, &[root.id]).await.unwrap();
        assert_eq!(fresh.get(&root.id), Some(&1));
    }

    #[tokio::test]
    async fn write_during_count_read_is_not_cached() {
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let alice = Profile::new(Uuid::new_v4(), "alice", "Alice");
        db.create_profile(&alice).await.unwrap();
        let root = db
            .insert_post(&NewPost {
                author_id: alice.id,
                content: "root".to_string(),
                media_urls: vec![],
                parent_id: None,
                repost_of: None,
            })
            .await
            .unwrap()
            .post;

        let cache = Arc::new(CountCache::new(16));
        let store = InterceptingDatabase::new(db.clone());
        let (hook_db, hook_cache, author, root_id) = (db.clone(), cache.clone(), alice.id, root.id);
        store.after_next_count(Box::pin(async move {
            let child = hook_db.insert_post(&reply(author, root_id)).await.unwrap().post;
            hook_cache.invalidate_post(&child).await;
        }));

        let first = cache.counts(&store, CountColumn::Parent, &[root.id]).await.unwrap();
        assert_eq!(first.get(&root.id), Some(&0));
        assert_eq!(cache.len().await, 0);

        let later = cache.counts(&store, CountColumn::Parent, &[root.id]).await.unwrap();
        assert_eq!(later.get(&root.id), Some(&1));
    }
}
