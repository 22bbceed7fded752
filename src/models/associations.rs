// Association edges - likes, bookmarks and follows share one (source, target) shape

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Like,
    Bookmark,
    Follow,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Like => "like",
            EdgeKind::Bookmark => "bookmark",
            EdgeKind::Follow => "follow",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EdgeKind::Like => "likes",
            EdgeKind::Bookmark => "bookmarks",
            EdgeKind::Follow => "follows",
        }
    }

    pub fn source_column(&self) -> &'static str {
        match self {
            EdgeKind::Like | EdgeKind::Bookmark => "user_id",
            EdgeKind::Follow => "follower_id",
        }
    }

    pub fn target_column(&self) -> &'static str {
        match self {
            EdgeKind::Like | EdgeKind::Bookmark => "post_id",
            EdgeKind::Follow => "following_id",
        }
    }
}

/// One membership row. Existence of the row is the boolean state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub source: Uuid,
    pub target: Uuid,
}

impl Edge {
    pub fn like(user_id: Uuid, post_id: Uuid) -> Self {
        Self { kind: EdgeKind::Like, source: user_id, target: post_id }
    }

    pub fn bookmark(user_id: Uuid, post_id: Uuid) -> Self {
        Self { kind: EdgeKind::Bookmark, source: user_id, target: post_id }
    }

    pub fn follow(follower_id: Uuid, following_id: Uuid) -> Self {
        Self { kind: EdgeKind::Follow, source: follower_id, target: following_id }
    }
}
