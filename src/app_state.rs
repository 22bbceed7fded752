use std::sync::Arc;

use crate::{
    config::Config,
    error::AppResult,
    feed::{CountCache, FeedService},
    infrastructure::{
        auth_store::AuthStore,
        database::DatabaseInterface,
        middleware::HasViewerResolver,
        sqlite_database::SqliteDatabase,
        storage::{LocalObjectStore, ObjectStore},
    },
    services::{
        AccountService, AdminService, EngagementService, FollowService, PostService,
        ProfileService, SearchService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn DatabaseInterface>,
    pub auth: Arc<AuthStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub feed: Arc<FeedService>,
    pub posts: PostService,
    pub engagement: EngagementService,
    pub follows: FollowService,
    pub profiles: ProfileService,
    pub search: SearchService,
    pub admin: AdminService,
    pub accounts: AccountService,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let database = SqliteDatabase::connect(&config.database.url).await?;
        Self::with_database(config, database).await
    }

    /// Wire services over an already-initialized database
    pub async fn with_database(config: Config, database: SqliteDatabase) -> AppResult<Self> {
        database.health_check().await?;
        let auth = Arc::new(AuthStore::new(database.pool().clone(), config.session.token_ttl_secs).await?);
        let db: Arc<dyn DatabaseInterface> = Arc::new(database);
        let storage: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
            config.storage.root.clone(),
            config.storage.public_base_url.clone(),
        ));

        let counts = Arc::new(CountCache::new(config.cache.capacity));
        let feed = Arc::new(FeedService::new(db.clone(), counts.clone()));

        Ok(Self {
            posts: PostService::new(db.clone(), counts, storage.clone()),
            engagement: EngagementService::new(db.clone()),
            follows: FollowService::new(db.clone()),
            profiles: ProfileService::new(db.clone(), storage.clone()),
            search: SearchService::new(db.clone(), feed.clone()),
            admin: AdminService::new(db.clone()),
            accounts: AccountService::new(db.clone(), auth.clone()),
            config,
            db,
            auth,
            storage,
            feed,
        })
    }
}

impl HasViewerResolver for AppState {
    fn auth_store(&self) -> &AuthStore {
        &self.auth
    }

    fn database(&self) -> &Arc<dyn DatabaseInterface> {
        &self.db
    }
}
