// EngagementService - like and bookmark toggles

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::models::Edge;

#[derive(Clone)]
pub struct EngagementService {
    db: Arc<dyn DatabaseInterface>,
}

impl EngagementService {
    pub fn new(db: Arc<dyn DatabaseInterface>) -> Self {
        Self { db }
    }

    /// Flip a like given the state the caller last saw. Returns the new state.
    pub async fn toggle_like(&self, user_id: Uuid, post_id: Uuid, currently_liked: bool) -> AppResult<bool> {
        self.toggle(Edge::like(user_id, post_id), currently_liked).await
    }

    pub async fn toggle_bookmark(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        currently_bookmarked: bool,
    ) -> AppResult<bool> {
        self.toggle(Edge::bookmark(user_id, post_id), currently_bookmarked).await
    }

    async fn toggle(&self, edge: Edge, currently_set: bool) -> AppResult<bool> {
        if currently_set {
            self.db.delete_edge(edge).await.map_err(AppError::into_mutation)?;
        } else {
            self.db.create_edge(edge).await.map_err(AppError::into_mutation)?;
        }
        debug!(kind = edge.kind.as_str(), source = %edge.source, target = %edge.target, set = !currently_set, "edge toggled");
        Ok(!currently_set)
    }
}
