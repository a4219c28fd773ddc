//! Learner identity: registration, login, logout and silent re-authentication.

use std::future::Future;
use std::time::Duration;

use learn_core::Clock;
use learn_core::model::{
    AuthToken, Badge, CHILD_AGE_MAX, CHILD_AGE_MIN, DEFAULT_IDENTIFIER_DOMAIN, Password,
    ProfilePatch, ProgressPatch, Session, UserId, UserProfile, UserProgress, UserType, Username,
};
use storage::repository::{SESSION_TOKEN_KEY, Storage, StorageError, UnlockedBadge};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{BackendConfig, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{SessionError, ValidationField};
use crate::retry::{RetryPolicy, retry_with_policy, with_timeout};

/// Where the learner is in the sign-in lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    /// A register, login or verify call is in flight.
    Authenticating,
    Authenticated(Session),
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.session().map(Session::user_id)
    }
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub identifier_domain: String,
    pub request_timeout: Duration,
    /// Backoff for the writes that depend on a freshly created identity.
    pub retry: RetryPolicy,
    /// Look the username up before sign-up for an early duplicate error.
    pub precheck_usernames: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            identifier_domain: DEFAULT_IDENTIFIER_DOMAIN.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            precheck_usernames: true,
        }
    }
}

impl From<&BackendConfig> for SessionOptions {
    fn from(config: &BackendConfig) -> Self {
        Self {
            identifier_domain: config.identifier_domain.clone(),
            request_timeout: config.request_timeout,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    token: Option<AuthToken>,
}

impl Inner {
    fn reset(&mut self) {
        self.state = SessionState::Anonymous;
        self.token = None;
    }
}

/// Owns the learner's identity state and mediates every call to the identity provider.
pub struct SessionManager {
    storage: Storage,
    clock: Clock,
    options: SessionOptions,
    inner: RwLock<Inner>,
}

impl SessionManager {
    #[must_use]
    pub fn new(storage: Storage, clock: Clock, options: SessionOptions) -> Self {
        Self {
            storage,
            clock,
            options,
            inner: RwLock::new(Inner::default()),
        }
    }

    // ─── Queries ───────────────────────────────────────────────────────────────

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state.clone()
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.read().await.state.session().cloned()
    }

    pub async fn current_user(&self) -> Option<UserId> {
        self.inner.read().await.state.user_id()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.state.is_authenticated()
    }

    // ─── Registration ──────────────────────────────────────────────────────────

    /// Create an identity, its profile and zeroed progress, then sign in.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for malformed input (no network call is
    /// made), `SessionError::DuplicateUsername` if the username is taken, or the
    /// mapped store error. Any failure after identity creation removes the identity.
    /// A current session is signed out first.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        user_type: UserType,
        child_age: u8,
    ) -> Result<Session, SessionError> {
        let username =
            Username::parse(username).map_err(|_| SessionError::validation(ValidationField::Username))?;
        let password =
            Password::parse(password).map_err(|_| SessionError::validation(ValidationField::Password))?;
        if !(CHILD_AGE_MIN..=CHILD_AGE_MAX).contains(&child_age) {
            return Err(SessionError::validation(ValidationField::ChildAge));
        }

        self.end_current_session().await;
        self.begin().await;
        let result = self
            .register_identity(username, &password, user_type, child_age)
            .await;
        self.finish(result).await
    }

    async fn register_identity(
        &self,
        username: Username,
        password: &Password,
        user_type: UserType,
        child_age: u8,
    ) -> Result<(Session, AuthToken), SessionError> {
        if self.options.precheck_usernames {
            match self
                .call(self.storage.profiles.find_by_username(&username))
                .await
            {
                Ok(Some(_)) => return Err(SessionError::DuplicateUsername),
                Ok(None) => {}
                Err(err) => debug!(error = %err, "username pre-check failed, relying on sign-up"),
            }
        }

        let identifier = username.synthetic_identifier(&self.options.identifier_domain);
        let user_id = self
            .call(self.storage.identity.sign_up(&identifier, password))
            .await
            .map_err(SessionError::from_sign_up)?;
        info!(%user_id, "identity created");

        let signed_in = match self
            .retrying("sign_in", || {
                self.call(
                    self.storage
                        .identity
                        .sign_in_with_password(&identifier, password),
                )
            })
            .await
        {
            Ok(signed_in) => signed_in,
            Err(err) => {
                self.roll_back(user_id, None).await;
                return Err(err.into());
            }
        };

        let now = self.clock.now();
        let profile = match UserProfile::new(user_id, username, user_type, child_age, None, now) {
            Ok(profile) => profile,
            Err(err) => {
                self.roll_back(user_id, Some(&signed_in.token)).await;
                return Err(err.into());
            }
        };
        if let Err(err) = self
            .retrying("insert_profile", || {
                self.call(self.storage.profiles.insert_profile(&profile))
            })
            .await
        {
            self.roll_back(user_id, Some(&signed_in.token)).await;
            return Err(SessionError::from_sign_up(err));
        }

        let progress = UserProgress::initial(user_id, now);
        if let Err(err) = self
            .retrying("insert_progress", || {
                self.call(self.storage.progress.insert_progress(&progress))
            })
            .await
        {
            warn!(%user_id, error = %err, "initial progress write failed, healing on next load");
        }
        self.cache(&progress).await;

        let session =
            Session::new(profile, progress).map_err(|e| SessionError::TransientStore(e.to_string()))?;
        Ok((session, signed_in.token))
    }

    /// Remove a half-registered identity so no orphan is left behind.
    async fn roll_back(&self, user_id: UserId, token: Option<&AuthToken>) {
        match self.call(self.storage.identity.delete_user(user_id)).await {
            Ok(()) => info!(%user_id, "rolled back identity"),
            Err(err) => error!(%user_id, error = %err, "identity rollback failed"),
        }
        if let Some(token) = token {
            if let Err(err) = self.call(self.storage.identity.sign_out(token)).await {
                debug!(error = %err, "sign-out after rollback failed");
            }
        }
    }

    // ─── Login / logout ────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `SessionError::InvalidCredentials` for a malformed or wrong
    /// username/password pair, or `SessionError::TransientStore` if the learner's
    /// records cannot be loaded. A current session is signed out first.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, SessionError> {
        let (Ok(username), Ok(password)) = (Username::parse(username), Password::parse(password))
        else {
            return Err(SessionError::InvalidCredentials);
        };

        self.end_current_session().await;
        self.begin().await;
        let result = self.sign_in(&username, &password).await;
        self.finish(result).await
    }

    async fn sign_in(
        &self,
        username: &Username,
        password: &Password,
    ) -> Result<(Session, AuthToken), SessionError> {
        let identifier = username.synthetic_identifier(&self.options.identifier_domain);
        let signed_in = self
            .call(
                self.storage
                    .identity
                    .sign_in_with_password(&identifier, password),
            )
            .await?;

        match self.load_session(signed_in.user_id).await {
            Ok(session) => Ok((session, signed_in.token)),
            Err(err) => {
                if let Err(sign_out) = self.call(self.storage.identity.sign_out(&signed_in.token)).await {
                    debug!(error = %sign_out, "sign-out after failed load failed");
                }
                Err(err)
            }
        }
    }

    /// Always ends `Anonymous`; remote failures are logged.
    pub async fn logout(&self) {
        let (token, user_id) = {
            let mut inner = self.inner.write().await;
            let user_id = inner.state.user_id();
            let token = inner.token.take();
            inner.reset();
            (token, user_id)
        };

        if let Some(token) = token {
            if let Err(err) = self.call(self.storage.identity.sign_out(&token)).await {
                warn!(error = %err, "remote sign-out failed");
            }
        }
        self.forget_token().await;
        if let Some(user_id) = user_id {
            if let Err(err) = self
                .call(self.storage.progress_cache.clear_cached(user_id))
                .await
            {
                debug!(error = %err, "could not clear progress cache");
            }
            info!(%user_id, "signed out");
        }
    }

    async fn end_current_session(&self) {
        if self.is_authenticated().await {
            debug!("ending current session before signing in again");
            self.logout().await;
        }
    }

    /// Restore a session from the persisted token. Never fails: any problem
    /// clears the token and leaves the manager `Anonymous`.
    pub async fn verify_session(&self) -> SessionState {
        let token = match self.call(self.storage.tokens.read_token(SESSION_TOKEN_KEY)).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                self.inner.write().await.reset();
                return SessionState::Anonymous;
            }
            Err(err) => {
                warn!(error = %err, "could not read persisted token");
                self.forget_token().await;
                self.inner.write().await.reset();
                return SessionState::Anonymous;
            }
        };

        self.begin().await;
        match self.restore(&token).await {
            Ok(session) => {
                info!(user_id = %session.user_id(), "session restored");
                let mut inner = self.inner.write().await;
                inner.state = SessionState::Authenticated(session);
                inner.token = Some(token);
                inner.state.clone()
            }
            Err(err) => {
                info!(error = %err, "persisted session rejected");
                self.forget_token().await;
                self.inner.write().await.reset();
                SessionState::Anonymous
            }
        }
    }

    async fn restore(&self, token: &AuthToken) -> Result<Session, SessionError> {
        if !self.call(self.storage.identity.verify_token(token)).await? {
            return Err(SessionError::NotAuthenticated);
        }
        let user_id = self
            .call(self.storage.identity.current_user(token))
            .await?
            .ok_or(SessionError::NotAuthenticated)?;
        self.load_session(user_id).await
    }

    // ─── Updates ───────────────────────────────────────────────────────────────

    /// Write the patch remotely, then adopt the stored profile locally.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` without a session,
    /// `SessionError::Validation` for an invalid patch, or the mapped store error.
    /// Local state is untouched on error.
    pub async fn update_profile(&self, patch: ProfilePatch) -> Result<UserProfile, SessionError> {
        let current = self.require_session().await?;
        patch.validate()?;
        if patch.is_empty() {
            return Ok(current.profile().clone());
        }

        let user_id = current.user_id();
        let updated = self
            .call(self.storage.profiles.update_profile(user_id, &patch))
            .await?;
        if updated.user_id() != user_id {
            return Err(SessionError::TransientStore(
                "store returned another user's profile".into(),
            ));
        }

        let mut inner = self.inner.write().await;
        if let SessionState::Authenticated(session) = &mut inner.state {
            if session.user_id() == user_id {
                *session = session
                    .clone()
                    .with_profile(updated.clone())
                    .map_err(|e| SessionError::TransientStore(e.to_string()))?;
            }
        }
        Ok(updated)
    }

    /// Write the counters remotely, then adopt the stored progress locally.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` without a session,
    /// `SessionError::Validation` if the patch would lower a counter, or the mapped
    /// store error. Local state is untouched on error.
    pub async fn update_progress(&self, patch: ProgressPatch) -> Result<UserProgress, SessionError> {
        let current = self.require_session().await?;
        current.progress().counters().merged(&patch)?;
        if patch.is_empty() {
            return Ok(current.progress().clone());
        }

        let user_id = current.user_id();
        let updated = self
            .call(
                self.storage
                    .progress
                    .update_progress(user_id, &patch, self.clock.now()),
            )
            .await?;
        if updated.user_id() != user_id {
            return Err(SessionError::TransientStore(
                "store returned another user's progress".into(),
            ));
        }

        {
            let mut inner = self.inner.write().await;
            if let SessionState::Authenticated(session) = &mut inner.state {
                if session.user_id() == user_id {
                    *session = session
                        .clone()
                        .with_progress(updated.clone())
                        .map_err(|e| SessionError::TransientStore(e.to_string()))?;
                }
            }
        }
        self.cache(&updated).await;
        Ok(updated)
    }

    // ─── Badges ────────────────────────────────────────────────────────────────

    /// Badges the signed-in learner has earned, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` without a session, or the mapped store error.
    pub async fn unlocked_badges(&self) -> Result<Vec<UnlockedBadge>, SessionError> {
        let user_id = self
            .current_user()
            .await
            .ok_or(SessionError::NotAuthenticated)?;
        Ok(self
            .call(self.storage.user_badges.list_unlocked(user_id))
            .await?)
    }

    /// Persist freshly unlocked badges. Failures are logged; the counters the
    /// unlocks derive from are already stored.
    pub(crate) async fn record_unlocks(&self, user_id: UserId, badges: &[Badge]) {
        let now = self.clock.now();
        for badge in badges {
            let recorded = self
                .retrying("record_unlock", || {
                    self.call(
                        self.storage
                            .user_badges
                            .record_unlock(user_id, badge.id(), now),
                    )
                })
                .await;
            if let Err(err) = recorded {
                warn!(%user_id, badge = badge.name(), error = %err, "could not record badge unlock");
            }
        }
    }

    // ─── Helpers ───────────────────────────────────────────────────────────────

    async fn require_session(&self) -> Result<Session, SessionError> {
        self.session().await.ok_or(SessionError::NotAuthenticated)
    }

    async fn begin(&self) {
        self.inner.write().await.state = SessionState::Authenticating;
    }

    async fn finish(
        &self,
        result: Result<(Session, AuthToken), SessionError>,
    ) -> Result<Session, SessionError> {
        match result {
            Ok((session, token)) => {
                if let Err(err) = self
                    .call(self.storage.tokens.write_token(SESSION_TOKEN_KEY, &token))
                    .await
                {
                    warn!(error = %err, "could not persist session token");
                }
                let mut inner = self.inner.write().await;
                inner.state = SessionState::Authenticated(session.clone());
                inner.token = Some(token);
                info!(user_id = %session.user_id(), "session authenticated");
                Ok(session)
            }
            Err(err) => {
                self.inner.write().await.reset();
                Err(err)
            }
        }
    }

    /// Profile plus progress; a missing progress row is recreated.
    async fn load_session(&self, user_id: UserId) -> Result<Session, SessionError> {
        let profile = self
            .call(self.storage.profiles.get_profile(user_id))
            .await?
            .ok_or_else(|| {
                warn!(%user_id, "identity has no profile");
                SessionError::TransientStore("profile not found".into())
            })?;

        let progress = match self.call(self.storage.progress.get_progress(user_id)).await? {
            Some(progress) => progress,
            None => self.heal_progress(user_id).await?,
        };
        self.reconcile_cache(&progress).await;

        Session::new(profile, progress).map_err(|e| SessionError::TransientStore(e.to_string()))
    }

    async fn heal_progress(&self, user_id: UserId) -> Result<UserProgress, SessionError> {
        let initial = UserProgress::initial(user_id, self.clock.now());
        match self.call(self.storage.progress.insert_progress(&initial)).await {
            Ok(()) => {
                info!(%user_id, "created missing progress record");
                Ok(initial)
            }
            // Someone else created it in the meantime.
            Err(StorageError::Conflict) => self
                .call(self.storage.progress.get_progress(user_id))
                .await?
                .ok_or_else(|| SessionError::TransientStore("progress not found".into())),
            Err(err) => Err(err.into()),
        }
    }

    /// The remote record wins; the device cache is overwritten with it.
    async fn reconcile_cache(&self, progress: &UserProgress) {
        match self
            .call(self.storage.progress_cache.load_cached(progress.user_id()))
            .await
        {
            Ok(Some(cached)) if cached != *progress.counters() => {
                debug!(user_id = %progress.user_id(), "replacing stale progress cache");
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "could not read progress cache"),
        }
        self.cache(progress).await;
    }

    async fn cache(&self, progress: &UserProgress) {
        if let Err(err) = self
            .call(self.storage.progress_cache.store_cached(progress))
            .await
        {
            debug!(error = %err, "could not cache progress");
        }
    }

    async fn forget_token(&self) {
        if let Err(err) = self
            .call(self.storage.tokens.clear_token(SESSION_TOKEN_KEY))
            .await
        {
            warn!(error = %err, "could not clear persisted token");
        }
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        with_timeout(self.options.request_timeout, fut).await
    }

    async fn retrying<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        retry_with_policy(&self.options.retry, operation, StorageError::is_transient, op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::time::fixed_clock;

    fn manager() -> SessionManager {
        SessionManager::new(Storage::in_memory(), fixed_clock(), SessionOptions::default())
    }

    #[tokio::test]
    async fn starts_anonymous() {
        let sessions = manager();
        assert_eq!(sessions.state().await, SessionState::Anonymous);
        assert!(sessions.session().await.is_none());
        assert!(!sessions.is_authenticated().await);
    }

    #[tokio::test]
    async fn register_then_state_is_authenticated() {
        let sessions = manager();
        let session = sessions
            .register("kid_one", "secret1", UserType::Parent, 7)
            .await
            .unwrap();
        assert_eq!(sessions.current_user().await, Some(session.user_id()));
        assert_eq!(session.profile().child_age(), 7);
        assert_eq!(session.progress().counters().quiz_score(), 0);
    }

    #[tokio::test]
    async fn child_age_out_of_range_is_rejected() {
        let sessions = manager();
        let err = sessions
            .register("kid_one", "secret1", UserType::Parent, 0)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::validation(ValidationField::ChildAge));
    }

    #[tokio::test]
    async fn updates_require_a_session() {
        let sessions = manager();
        assert_eq!(
            sessions.update_profile(ProfilePatch::default()).await,
            Err(SessionError::NotAuthenticated)
        );
        assert_eq!(
            sessions.update_progress(ProgressPatch::default()).await,
            Err(SessionError::NotAuthenticated)
        );
    }
}
