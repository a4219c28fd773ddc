use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{
    AuthToken, Badge, BadgeId, Book, ContentScope, Password, ProfilePatch, ProgressCounters,
    ProgressPatch, UserId, UserProfile, UserProgress, Username, Word, WordDraft,
};
use thiserror::Error;

/// Key the learner session token is persisted under.
pub const SESSION_TOKEN_KEY: &str = "session_token";
/// Key the admin token is persisted under.
pub const ADMIN_TOKEN_KEY: &str = "admin_token";

/// Errors surfaced by storage adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Network-level failures that may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Timeout | StorageError::Connection(_))
    }
}

impl From<learn_core::Error> for StorageError {
    fn from(err: learn_core::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result of a successful password sign-in.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user_id: UserId,
    pub token: AuthToken,
}

/// External authentication service.
///
/// `identifier` is the provider-facing login handle (address-shaped), never
/// the raw username.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an identity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the identifier is already registered.
    async fn sign_up(&self, identifier: &str, password: &Password) -> Result<UserId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::InvalidCredentials` on a bad identifier/password pair.
    async fn sign_in_with_password(
        &self,
        identifier: &str,
        password: &Password,
    ) -> Result<SignedIn, StorageError>;

    /// Invalidate a provider session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the provider cannot be reached.
    async fn sign_out(&self, token: &AuthToken) -> Result<(), StorageError>;

    /// User behind `token`, or `None` if the token is not (or no longer) valid.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the provider cannot be reached.
    async fn current_user(&self, token: &AuthToken) -> Result<Option<UserId>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the provider cannot be reached.
    async fn verify_token(&self, token: &AuthToken) -> Result<bool, StorageError>;

    /// Remove an identity. Used to roll back a half-finished registration.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PermissionDenied` if the provider holds no
    /// privileged credentials, or another `StorageError` if the identity cannot
    /// be removed.
    async fn delete_user(&self, user_id: UserId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the user or username already has a profile.
    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), StorageError>;

    /// Single-row fetch; a missing row is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the profile does not exist.
    async fn update_profile(
        &self,
        user_id: UserId,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn find_by_username(&self, username: &Username)
    -> Result<Option<UserProfile>, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the user already has a progress row.
    async fn insert_progress(&self, progress: &UserProgress) -> Result<(), StorageError>;

    /// Single-row fetch; a missing row is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn get_progress(&self, user_id: UserId) -> Result<Option<UserProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no row to update.
    async fn update_progress(
        &self,
        user_id: UserId,
        patch: &ProgressPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<UserProgress, StorageError>;
}

/// Content catalogs; learners may add words of their own.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Words visible to the scope's user whose age range contains its child age.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn list_words(&self, scope: &ContentScope) -> Result<Vec<Word>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn list_books(&self, scope: &ContentScope) -> Result<Vec<Book>, StorageError>;

    /// Badge definitions visible to the scope's user. Badges carry no age range.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn list_badges(&self, scope: &ContentScope) -> Result<Vec<Badge>, StorageError>;

    /// Store a word owned by `owner` and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn add_word(&self, owner: UserId, draft: &WordDraft) -> Result<Word, StorageError>;
}

/// A badge a learner has earned, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockedBadge {
    pub badge_id: BadgeId,
    pub unlocked_at: DateTime<Utc>,
}

/// Per-learner record of earned badges.
#[async_trait]
pub trait UserBadgeRepository: Send + Sync {
    /// Most recent first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn list_unlocked(&self, user_id: UserId) -> Result<Vec<UnlockedBadge>, StorageError>;

    /// Record an unlock. Recording the same badge twice is not an error and
    /// keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport failures.
    async fn record_unlock(
        &self,
        user_id: UserId,
        badge_id: BadgeId,
        unlocked_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// Locally persisted tokens, one per well-known key.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if local storage cannot be read.
    async fn read_token(&self, key: &str) -> Result<Option<AuthToken>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if local storage cannot be written.
    async fn write_token(&self, key: &str, token: &AuthToken) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if local storage cannot be written.
    async fn clear_token(&self, key: &str) -> Result<(), StorageError>;
}

/// Last-known counters kept on device, reconciled against the remote store on load.
#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if local storage cannot be read.
    async fn load_cached(&self, user_id: UserId) -> Result<Option<ProgressCounters>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if local storage cannot be written.
    async fn store_cached(&self, progress: &UserProgress) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if local storage cannot be written.
    async fn clear_cached(&self, user_id: UserId) -> Result<(), StorageError>;
}

/// Aggregates collaborators behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub content: Arc<dyn ContentRepository>,
    pub user_badges: Arc<dyn UserBadgeRepository>,
    pub tokens: Arc<dyn TokenStore>,
    pub progress_cache: Arc<dyn ProgressCache>,
}
