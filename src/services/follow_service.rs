// FollowService - directed follow edges between profiles

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::models::{Edge, EdgeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FollowCounts {
    pub followers: u64,
    pub following: u64,
}

#[derive(Clone)]
pub struct FollowService {
    db: Arc<dyn DatabaseInterface>,
}

impl FollowService {
    pub fn new(db: Arc<dyn DatabaseInterface>) -> Self {
        Self { db }
    }

    /// Follow or unfollow. Returns whether `follower` now follows `target`.
    pub async fn toggle(&self, follower: Uuid, target: Uuid, currently_following: bool) -> AppResult<bool> {
        if follower == target {
            return Err(AppError::Validation("Cannot follow yourself".to_string()));
        }

        let edge = Edge::follow(follower, target);
        if currently_following {
            self.db.delete_edge(edge).await.map_err(AppError::into_mutation)?;
        } else {
            self.db.create_edge(edge).await.map_err(AppError::into_mutation)?;
        }

        info!(%follower, %target, following = !currently_following, "follow toggled");
        Ok(!currently_following)
    }

    pub async fn is_following(&self, follower: Uuid, target: Uuid) -> AppResult<bool> {
        self.db
            .edge_exists(Edge::follow(follower, target))
            .await
            .map_err(AppError::into_query)
    }

    pub async fn counts(&self, user_id: Uuid) -> AppResult<FollowCounts> {
        let (followers, following) = futures::try_join!(
            self.db.count_edges_to(EdgeKind::Follow, user_id),
            self.db.count_edges_from(EdgeKind::Follow, user_id),
        )
        .map_err(AppError::into_query)?;

        Ok(FollowCounts { followers, following })
    }
}
