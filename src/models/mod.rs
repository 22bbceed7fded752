// Domain models - persisted rows and the derived read models built from them

pub mod associations;
pub mod post;
pub mod profile;

pub use associations::{Edge, EdgeKind};
pub use post::{FeedPage, FeedType, NewPost, PaginatedResponse, Post, PostRow, PostWithCounts};
pub use profile::{Profile, ProfileUpdate, ProfileWithCounts, UserRole};

use chrono::{DateTime, TimeZone, Utc};

/// Current wall clock time as epoch milliseconds, the storage resolution for all timestamps.
pub fn current_time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
