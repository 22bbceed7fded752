// Domain services - the write paths and lookups behind the HTTP surface

pub mod account_service;
pub mod admin_service;
pub mod engagement_service;
pub mod follow_service;
pub mod post_service;
pub mod profile_service;
pub mod search_service;

pub use account_service::{AccountService, Registration};
pub use admin_service::AdminService;
pub use engagement_service::EngagementService;
pub use follow_service::{FollowCounts, FollowService};
pub use post_service::{PostDraft, PostService};
pub use profile_service::{ProfileEdit, ProfileImage, ProfileService};
pub use search_service::SearchService;
