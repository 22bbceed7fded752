// AdminService - user listing and role management, gated on ManageRoles

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::security::Capability;
use crate::infrastructure::viewer::ViewerContext;
use crate::models::{Profile, ProfileUpdate, UserRole};

#[derive(Clone)]
pub struct AdminService {
    db: Arc<dyn DatabaseInterface>,
}

impl AdminService {
    pub fn new(db: Arc<dyn DatabaseInterface>) -> Self {
        Self { db }
    }

    /// Every profile, oldest account first
    pub async fn list_users(&self, vc: &ViewerContext) -> AppResult<Vec<Profile>> {
        vc.require(Capability::ManageRoles)?;
        self.db.list_profiles().await.map_err(AppError::into_query)
    }

    #[instrument(skip(self, vc), fields(admin = ?vc.user_id))]
    pub async fn set_role(&self, vc: &ViewerContext, user_id: Uuid, role: UserRole) -> AppResult<Profile> {
        vc.require(Capability::ManageRoles)?;

        let profile = self
            .db
            .update_profile(
                user_id,
                &ProfileUpdate {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await
            .map_err(AppError::into_mutation)?;

        info!(%user_id, %role, "role changed");
        Ok(profile)
    }
}
