use crate::error::AppError;
use crate::infrastructure::auth_store::AuthUser;
use crate::infrastructure::security::{self, Capability};
use crate::models::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Authenticated,
    Anonymous,
}

/// Snapshot of who is signed in. `error` is non-fatal: the user stays signed in
/// with `profile = None` when the profile could not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub is_loading: bool,
    pub error: Option<AppError>,
}

impl SessionState {
    pub fn initializing() -> Self {
        Self {
            user: None,
            profile: None,
            is_loading: true,
            error: None,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            is_loading: false,
            ..Self::initializing()
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.user, self.is_loading) {
            (Some(_), _) => SessionPhase::Authenticated,
            (None, true) => SessionPhase::Initializing,
            (None, false) => SessionPhase::Anonymous,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.profile
            .as_ref()
            .is_some_and(|profile| security::can(profile.role, Capability::ManageRoles))
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initializing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::auth_store::UserMetadata;
    use crate::models::UserRole;
    use chrono::Utc;
    use uuid::Uuid;

    fn user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            metadata: UserMetadata {
                username: "a".to_string(),
                full_name: String::new(),
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn phases_follow_user_and_loading() {
        assert_eq!(SessionState::initializing().phase(), SessionPhase::Initializing);
        assert_eq!(SessionState::anonymous().phase(), SessionPhase::Anonymous);

        let mut state = SessionState::initializing();
        state.user = Some(user());
        assert_eq!(state.phase(), SessionPhase::Authenticated);
    }

    #[test]
    fn admin_flag_comes_from_profile_role() {
        let u = user();
        let mut profile = Profile::new(u.id, "a", "A");
        let mut state = SessionState::anonymous();
        state.user = Some(u);
        state.profile = Some(profile.clone());
        assert!(!state.is_admin());

        profile.role = UserRole::Admin;
        state.profile = Some(profile);
        assert!(state.is_admin());
    }
}
