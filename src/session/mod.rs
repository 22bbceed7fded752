// Auth Session State - the signed-in user and their profile for the app lifetime
// One event loop consumes provider events; profile resolution runs in a task that
// only applies its result while its generation is still current.

pub mod provider;
pub mod state;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::auth_store::AuthUser;
use crate::infrastructure::database::ProfileSource;
use crate::models::Profile;

pub use provider::{AuthEvent, AuthEventKind, AuthProvider, AuthSubscription, LocalAuthProvider};
pub use state::{SessionPhase, SessionState};

const NOTICE_BUFFER: usize = 16;

/// Navigation side effects for the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    RedirectToLogin,
}

#[derive(Default)]
struct Resolution {
    generation: u64,
    user_id: Option<Uuid>,
    task: Option<JoinHandle<()>>,
}

impl Resolution {
    fn is_live_for(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Invalidate whatever is in flight and return the new generation
    fn supersede(&mut self, user_id: Option<Uuid>) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
        self.user_id = user_id;
        self.generation
    }
}

struct Inner {
    provider: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileSource>,
    retry_delay: Duration,
    state: watch::Sender<SessionState>,
    notices: broadcast::Sender<SessionNotice>,
    resolution: Mutex<Resolution>,
}

pub struct AuthSession {
    inner: Arc<Inner>,
    event_loop: JoinHandle<()>,
}

impl AuthSession {
    /// Subscribe to the provider and start tracking its session
    pub async fn start(
        provider: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileSource>,
        retry_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::initializing());
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);
        let inner = Arc::new(Inner {
            provider: provider.clone(),
            profiles,
            retry_delay,
            state,
            notices,
            resolution: Mutex::new(Resolution::default()),
        });

        let mut subscription = provider.subscribe().await;
        let loop_inner = inner.clone();
        let event_loop = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                loop_inner.handle_event(event).await;
            }
            debug!("auth event stream closed");
        });

        Self { inner, event_loop }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices.subscribe()
    }

    pub fn is_admin(&self) -> bool {
        self.inner.state.borrow().is_admin()
    }

    /// Re-read the current user's profile once, without retry. The user never changes.
    /// Returns `None` when nobody is signed in.
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self) -> AppResult<Option<Profile>> {
        let current = self.inner.state.borrow().user.as_ref().map(|u| u.id);
        let Some(user_id) = current else {
            return Ok(None);
        };
        let generation = self.inner.resolution.lock().await.generation;

        let outcome = self.inner.lookup(user_id).await;
        self.inner.apply(generation, outcome.clone(), false).await;
        outcome.map(Some)
    }

    /// Sign out with the provider and clear local state even if that call fails
    pub async fn sign_out(&self) -> AppResult<()> {
        let result = self.inner.provider.sign_out().await;
        if let Err(e) = &result {
            warn!(error = %e, "provider sign out failed, clearing local session anyway");
        }
        self.inner.clear(true).await;
        result
    }

    pub async fn shutdown(&self) {
        self.event_loop.abort();
        self.inner.resolution.lock().await.supersede(None);
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

impl Inner {
    async fn handle_event(self: &Arc<Self>, event: AuthEvent) {
        debug!(kind = ?event.kind, has_session = event.session.is_some(), "auth event");

        match event.user().cloned() {
            Some(user) => self.track_user(user).await,
            None => {
                let redirect = matches!(
                    event.kind,
                    AuthEventKind::SignedOut | AuthEventKind::TokenRefreshed
                );
                self.clear(redirect).await;
            }
        }
    }

    async fn track_user(self: &Arc<Self>, user: AuthUser) {
        let mut resolution = self.resolution.lock().await;
        let user_id = user.id;

        if resolution.is_live_for(user_id) {
            self.state.send_modify(|state| state.user = Some(user));
            return;
        }

        let generation = resolution.supersede(Some(user_id));
        self.state.send_modify(|state| {
            if state.user.as_ref().map(|u| u.id) != Some(user_id) {
                state.profile = None;
            }
            state.user = Some(user);
            state.is_loading = true;
            state.error = None;
        });

        let inner = self.clone();
        resolution.task = Some(tokio::spawn(async move {
            let outcome = inner.resolve_with_retry(user_id).await;
            inner.apply(generation, outcome, true).await;
        }));
    }

    /// Drop user and profile. The redirect notice fires only on the transition into Anonymous.
    async fn clear(&self, redirect: bool) {
        let mut resolution = self.resolution.lock().await;
        resolution.supersede(None);

        let was_anonymous = self.state.borrow().phase() == SessionPhase::Anonymous;
        self.state.send_replace(SessionState::anonymous());
        drop(resolution);

        if redirect && !was_anonymous {
            info!("session ended, redirecting to login");
            let _ = self.notices.send(SessionNotice::RedirectToLogin);
        }
    }

    async fn resolve_with_retry(&self, user_id: Uuid) -> AppResult<Profile> {
        match self.lookup(user_id).await {
            Ok(profile) => Ok(profile),
            Err(first) => {
                warn!(%user_id, error = %first, delay_ms = self.retry_delay.as_millis() as u64, "profile lookup failed, retrying");
                tokio::time::sleep(self.retry_delay).await;
                self.lookup(user_id).await
            }
        }
    }

    async fn lookup(&self, user_id: Uuid) -> AppResult<Profile> {
        match self.profiles.fetch_profile(user_id).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(AppError::ProfileLookup(format!("No profile for user {}", user_id))),
            Err(e) => Err(AppError::ProfileLookup(e.to_string())),
        }
    }

    /// Publish a lookup outcome unless a newer generation has taken over.
    /// Only the resolution task may `settle`; a refresh leaves `is_loading` to it.
    async fn apply(&self, generation: u64, outcome: AppResult<Profile>, settle: bool) {
        let resolution = self.resolution.lock().await;
        if resolution.generation != generation {
            debug!(generation, current = resolution.generation, "discarding stale profile lookup");
            return;
        }

        self.state.send_modify(|state| {
            match outcome {
                Ok(profile) => {
                    state.profile = Some(profile);
                    state.error = None;
                }
                Err(e) => {
                    warn!(error = %e, "profile unavailable, continuing without it");
                    state.profile = None;
                    state.error = Some(e);
                }
            }
            if settle {
                state.is_loading = false;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::auth_store::{Session, UserMetadata};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider driven by the test through `push`
    struct ScriptedProvider {
        current: Option<Session>,
        events: broadcast::Sender<AuthEvent>,
    }

    impl ScriptedProvider {
        fn new(current: Option<Session>) -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self { current, events })
        }

        fn push(&self, kind: AuthEventKind, session: Option<Session>) {
            self.events.send(AuthEvent::new(kind, session)).unwrap();
        }
    }

    #[async_trait]
    impl AuthProvider for ScriptedProvider {
        async fn sign_in(&self, _email: &str, _password: &str) -> AppResult<Session> {
            Err(AppError::Auth("Invalid login credentials".to_string()))
        }
        async fn sign_up(&self, _e: &str, _p: &str, _m: UserMetadata) -> AppResult<AuthUser> {
            Err(AppError::Auth("disabled".to_string()))
        }
        async fn sign_out(&self) -> AppResult<()> {
            Ok(())
        }
        async fn refresh(&self) -> AppResult<Option<Session>> {
            Ok(None)
        }
        async fn current_session(&self) -> Option<Session> {
            self.current.clone()
        }
        async fn subscribe(&self) -> AuthSubscription {
            AuthSubscription::new(self.current.clone(), self.events.subscribe())
        }
    }

    /// Fails the first `failures` lookups, then serves a profile
    struct FlakyProfiles {
        failures: usize,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FlakyProfiles {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl ProfileSource for FlakyProfiles {
        async fn fetch_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if call < self.failures {
                return Err(AppError::Database("connection reset".to_string()));
            }
            Ok(Some(Profile::new(user_id, "someone", "Someone")))
        }
    }

    fn session_for(username: &str) -> Session {
        Session {
            access_token: format!("token-{}", username),
            user: AuthUser {
                id: Uuid::new_v4(),
                email: format!("{}@example.com", username),
                metadata: UserMetadata {
                    username: username.to_string(),
                    full_name: String::new(),
                },
                created_at: Utc::now(),
            },
            expires_at: Utc::now(),
        }
    }

    async fn settled(session: &AuthSession) -> SessionState {
        let mut rx = session.subscribe();
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| !s.is_loading),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        state
    }

    #[tokio::test]
    async fn initial_empty_session_is_anonymous_without_redirect() {
        let provider = ScriptedProvider::new(None);
        let session = AuthSession::start(provider, FlakyProfiles::new(0), Duration::from_millis(5)).await;
        let mut notices = session.notices();

        let state = settled(&session).await;
        assert_eq!(state.phase(), SessionPhase::Anonymous);
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn single_failure_is_retried() {
        let s = session_for("ada");
        let profiles = FlakyProfiles::new(1);
        let session = AuthSession::start(
            ScriptedProvider::new(Some(s.clone())),
            profiles.clone(),
            Duration::from_millis(5),
        )
        .await;

        let state = settled(&session).await;
        assert_eq!(state.profile.map(|p| p.id), Some(s.user.id));
        assert_eq!(state.error, None);
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn double_failure_keeps_user_without_profile() {
        let s = session_for("bob");
        let session = AuthSession::start(
            ScriptedProvider::new(Some(s.clone())),
            FlakyProfiles::new(2),
            Duration::from_millis(5),
        )
        .await;

        let state = settled(&session).await;
        assert_eq!(state.phase(), SessionPhase::Authenticated);
        assert_eq!(state.user.map(|u| u.id), Some(s.user.id));
        assert!(state.profile.is_none());
        assert!(matches!(state.error, Some(AppError::ProfileLookup(_))));
    }

    #[tokio::test]
    async fn sign_out_event_clears_and_redirects() {
        let s = session_for("cy");
        let provider = ScriptedProvider::new(Some(s));
        let session = AuthSession::start(provider.clone(), FlakyProfiles::new(0), Duration::from_millis(5)).await;
        let mut notices = session.notices();
        settled(&session).await;

        provider.push(AuthEventKind::SignedOut, None);
        let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notice, SessionNotice::RedirectToLogin);

        let state = session.state();
        assert_eq!(state.phase(), SessionPhase::Anonymous);
        assert!(state.user.is_none() && state.profile.is_none());
    }

    #[tokio::test]
    async fn switching_users_discards_stale_resolution() {
        let first = session_for("dee");
        let second = session_for("eve");
        let provider = ScriptedProvider::new(Some(first));
        let profiles = Arc::new(FlakyProfiles {
            failures: 0,
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let session = AuthSession::start(provider.clone(), profiles, Duration::from_millis(5)).await;

        provider.push(AuthEventKind::SignedIn, Some(second.clone()));
        let mut rx = session.subscribe();
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.user.as_ref().map(|u| u.id) == Some(second.user.id) && !s.is_loading),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        assert_eq!(state.profile.map(|p| p.id), Some(second.user.id));
    }

    #[tokio::test]
    async fn repeated_event_for_same_user_does_not_refetch() {
        let s = session_for("fay");
        let provider = ScriptedProvider::new(Some(s.clone()));
        let profiles = Arc::new(FlakyProfiles {
            failures: 0,
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(100),
        });
        let session = AuthSession::start(provider.clone(), profiles.clone(), Duration::from_millis(5)).await;

        provider.push(AuthEventKind::TokenRefreshed, Some(s));
        settled(&session).await;
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_profile_is_a_single_attempt() {
        let s = session_for("gus");
        let profiles = FlakyProfiles::new(0);
        let session = AuthSession::start(
            ScriptedProvider::new(Some(s.clone())),
            profiles.clone(),
            Duration::from_millis(5),
        )
        .await;
        settled(&session).await;

        let refreshed = session.refresh_profile().await.unwrap();
        assert_eq!(refreshed.map(|p| p.id), Some(s.user.id));
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 2);
        assert_eq!(session.state().user.map(|u| u.id), Some(s.user.id));
    }

    #[tokio::test]
    async fn refresh_during_resolution_leaves_loading_to_it() {
        let s = session_for("hal");
        let profiles = FlakyProfiles::new(1);
        let session = AuthSession::start(
            ScriptedProvider::new(Some(s.clone())),
            profiles.clone(),
            Duration::from_millis(300),
        )
        .await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while profiles.calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let refreshed = session.refresh_profile().await.unwrap();
        assert_eq!(refreshed.map(|p| p.id), Some(s.user.id));
        let mid = session.state();
        assert!(mid.is_loading);
        assert_eq!(mid.profile.map(|p| p.id), Some(s.user.id));

        let state = settled(&session).await;
        assert_eq!(state.profile.map(|p| p.id), Some(s.user.id));
        assert_eq!(state.error, None);
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 3);
    }
}
