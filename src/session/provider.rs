// Auth provider - session issuance plus a stream of auth state changes

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::error::AppResult;
use crate::infrastructure::auth_store::{AuthStore, AuthUser, Session, UserMetadata};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.session.as_ref().map(|session| &session.user)
    }
}

/// Event stream whose first item is the session current at subscription time
pub struct AuthSubscription {
    initial: Option<AuthEvent>,
    events: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    pub fn new(current: Option<Session>, events: broadcast::Receiver<AuthEvent>) -> Self {
        Self {
            initial: Some(AuthEvent::new(AuthEventKind::InitialSession, current)),
            events,
        }
    }

    /// Next event, or `None` once the provider is gone
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session>;
    async fn sign_up(&self, email: &str, password: &str, metadata: UserMetadata) -> AppResult<AuthUser>;
    async fn sign_out(&self) -> AppResult<()>;
    /// Rotate the current token. `None` when there is no live session.
    async fn refresh(&self) -> AppResult<Option<Session>>;
    async fn current_session(&self) -> Option<Session>;
    async fn subscribe(&self) -> AuthSubscription;
}

/// Client-side provider over the local auth store. Holds at most one session.
pub struct LocalAuthProvider {
    store: Arc<AuthStore>,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl LocalAuthProvider {
    pub fn new(store: Arc<AuthStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            store,
            current: RwLock::new(None),
            events,
        }
    }

    /// Resume from a stored session, as when an app restarts with a saved token
    pub async fn with_session(store: Arc<AuthStore>, session: Session) -> Self {
        let provider = Self::new(store);
        *provider.current.write().await = Some(session);
        provider
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        // No subscribers is fine
        let _ = self.events.send(AuthEvent::new(kind, session));
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let session = self.store.sign_in(email, password).await?;
        *self.current.write().await = Some(session.clone());
        info!(user_id = %session.user.id, "signed in");
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: UserMetadata) -> AppResult<AuthUser> {
        self.store.sign_up(email, password, metadata).await
    }

    async fn sign_out(&self) -> AppResult<()> {
        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            self.store.sign_out(&session.access_token).await?;
        }
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }

    async fn refresh(&self) -> AppResult<Option<Session>> {
        let Some(token) = self
            .current
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
        else {
            return Ok(None);
        };

        let refreshed = self.store.refresh(&token).await?;
        *self.current.write().await = refreshed.clone();
        self.emit(AuthEventKind::TokenRefreshed, refreshed.clone());
        Ok(refreshed)
    }

    async fn current_session(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    async fn subscribe(&self) -> AuthSubscription {
        // Subscribe before reading so no event slips between the two
        let events = self.events.subscribe();
        AuthSubscription::new(self.current_session().await, events)
    }
}
