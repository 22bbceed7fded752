// Core infrastructure modules
pub mod auth_store;        // Credentials and bearer sessions
pub mod cache;             // Bounded LRU cache
pub mod database;          // Database interface and query types
pub mod middleware;        // Viewer context middleware and extractor
pub mod security;          // Role capabilities
pub mod sqlite_database;   // SQLite implementation of the database interface
pub mod storage;           // Object storage for uploaded media
#[cfg(test)]
pub mod test_support;      // Intercepting database for failure-path tests
pub mod viewer;            // Viewer context

pub use auth_store::{AuthStore, AuthUser, Session, UserMetadata};
pub use cache::Cache;
pub use database::{DatabaseInterface, ParentFilter, PostKey, PostQuery, ProfileSource};
pub use security::Capability;
pub use sqlite_database::SqliteDatabase;
pub use storage::{LocalObjectStore, ObjectStore};
pub use viewer::ViewerContext;
