//! In-memory collaborators for tests and prototyping.
//!
//! Every adapter records how often each operation was called and can be told
//! to fail the next N calls of an operation, so service tests can assert on
//! network traffic and exercise failure paths without a live backend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{
    AuthToken, Badge, BadgeId, Book, ContentOwner, ContentScope, Password, ProfilePatch,
    ProgressCounters, ProgressPatch, UserId, UserProfile, UserProgress, Username, Word, WordDraft,
    WordId,
};
use uuid::Uuid;

use crate::repository::{
    ContentRepository, IdentityProvider, ProfileRepository, ProgressCache, ProgressRepository,
    SignedIn, Storage, StorageError, TokenStore, UnlockedBadge, UserBadgeRepository,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

/// Operations the in-memory adapters count and can fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SignUp,
    SignIn,
    SignOut,
    CurrentUser,
    VerifyToken,
    DeleteUser,
    InsertProfile,
    GetProfile,
    UpdateProfile,
    FindByUsername,
    InsertProgress,
    GetProgress,
    UpdateProgress,
    ListWords,
    ListBooks,
    ListBadges,
    AddWord,
    ListUnlocked,
    RecordUnlock,
    ReadToken,
    WriteToken,
    ClearToken,
}

#[derive(Default)]
struct CallState {
    calls: HashMap<Op, usize>,
    failures: HashMap<Op, VecDeque<StorageError>>,
}

/// Shared call counter and failure queue.
#[derive(Clone, Default)]
pub struct CallLog {
    state: Arc<Mutex<CallState>>,
}

impl CallLog {
    /// Fail the next `times` calls of `op` with `err`.
    pub fn fail_times(&self, op: Op, err: StorageError, times: usize) {
        if let Ok(mut state) = self.state.lock() {
            let queue = state.failures.entry(op).or_default();
            queue.extend(std::iter::repeat_n(err, times));
        }
    }

    pub fn fail_next(&self, op: Op, err: StorageError) {
        self.fail_times(op, err, 1);
    }

    #[must_use]
    pub fn calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .map(|state| state.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.calls.values().sum())
            .unwrap_or(0)
    }

    fn enter(&self, op: Op) -> Result<(), StorageError> {
        let mut state = lock(&self.state)?;
        *state.calls.entry(op).or_default() += 1;
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

//
// ─── IDENTITY PROVIDER ─────────────────────────────────────────────────────────
//

struct Account {
    user_id: UserId,
    password: String,
}

#[derive(Default)]
struct IdentityState {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, UserId>,
}

/// Identity provider that enforces identifier uniqueness like a real one.
#[derive(Clone, Default)]
pub struct InMemoryIdentityProvider {
    state: Arc<Mutex<IdentityState>>,
    log: CallLog,
}

impl InMemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> &CallLog {
        &self.log
    }

    #[must_use]
    pub fn account_count(&self) -> usize {
        self.state.lock().map(|s| s.accounts.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn has_identifier(&self, identifier: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.accounts.contains_key(identifier))
            .unwrap_or(false)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(&self, identifier: &str, password: &Password) -> Result<UserId, StorageError> {
        self.log.enter(Op::SignUp)?;
        let mut state = lock(&self.state)?;
        if state.accounts.contains_key(identifier) {
            return Err(StorageError::Conflict);
        }
        let user_id = UserId::random();
        state.accounts.insert(
            identifier.to_owned(),
            Account {
                user_id,
                password: password.expose().to_owned(),
            },
        );
        Ok(user_id)
    }

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        password: &Password,
    ) -> Result<SignedIn, StorageError> {
        self.log.enter(Op::SignIn)?;
        let mut state = lock(&self.state)?;
        let user_id = match state.accounts.get(identifier) {
            Some(account) if account.password == password.expose() => account.user_id,
            _ => return Err(StorageError::InvalidCredentials),
        };
        let raw = Uuid::new_v4().simple().to_string();
        let token =
            AuthToken::parse(raw.clone()).map_err(|e| StorageError::Serialization(e.to_string()))?;
        state.sessions.insert(raw, user_id);
        Ok(SignedIn { user_id, token })
    }

    async fn sign_out(&self, token: &AuthToken) -> Result<(), StorageError> {
        self.log.enter(Op::SignOut)?;
        lock(&self.state)?.sessions.remove(token.expose());
        Ok(())
    }

    async fn current_user(&self, token: &AuthToken) -> Result<Option<UserId>, StorageError> {
        self.log.enter(Op::CurrentUser)?;
        Ok(lock(&self.state)?.sessions.get(token.expose()).copied())
    }

    async fn verify_token(&self, token: &AuthToken) -> Result<bool, StorageError> {
        self.log.enter(Op::VerifyToken)?;
        Ok(lock(&self.state)?.sessions.contains_key(token.expose()))
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), StorageError> {
        self.log.enter(Op::DeleteUser)?;
        let mut state = lock(&self.state)?;
        let before = state.accounts.len();
        state.accounts.retain(|_, account| account.user_id != user_id);
        if state.accounts.len() == before {
            return Err(StorageError::NotFound);
        }
        state.sessions.retain(|_, owner| *owner != user_id);
        Ok(())
    }
}

//
// ─── TABLES ────────────────────────────────────────────────────────────────────
//

/// Profile, progress and content tables plus device-local token and cache storage.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    profiles: Arc<Mutex<HashMap<UserId, UserProfile>>>,
    progress: Arc<Mutex<HashMap<UserId, UserProgress>>>,
    words: Arc<Mutex<Vec<Word>>>,
    books: Arc<Mutex<Vec<Book>>>,
    badges: Arc<Mutex<Vec<(ContentOwner, Badge)>>>,
    user_badges: Arc<Mutex<HashMap<UserId, Vec<UnlockedBadge>>>>,
    tokens: Arc<Mutex<HashMap<String, AuthToken>>>,
    cache: Arc<Mutex<HashMap<UserId, ProgressCounters>>>,
    log: CallLog,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> &CallLog {
        &self.log
    }

    pub fn seed_word(&self, word: Word) {
        if let Ok(mut words) = self.words.lock() {
            words.push(word);
        }
    }

    pub fn seed_book(&self, book: Book) {
        if let Ok(mut books) = self.books.lock() {
            books.push(book);
        }
    }

    pub fn seed_badge(&self, owner: ContentOwner, badge: Badge) {
        if let Ok(mut badges) = self.badges.lock() {
            badges.push((owner, badge));
        }
    }

    /// Drop a progress row, simulating a registration whose progress write was lost.
    pub fn forget_progress(&self, user_id: UserId) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.remove(&user_id);
        }
    }

    #[must_use]
    pub fn profile_count(&self) -> usize {
        self.profiles.lock().map(|p| p.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn unlocked_ids(&self, user_id: UserId) -> Vec<BadgeId> {
        self.user_badges
            .lock()
            .map(|all| {
                all.get(&user_id)
                    .map(|rows| rows.iter().map(|row| row.badge_id).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        self.log.enter(Op::InsertProfile)?;
        let mut guard = lock(&self.profiles)?;
        let taken = guard.contains_key(&profile.user_id())
            || guard.values().any(|p| {
                p.username()
                    .as_str()
                    .eq_ignore_ascii_case(profile.username().as_str())
            });
        if taken {
            return Err(StorageError::Conflict);
        }
        guard.insert(profile.user_id(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StorageError> {
        self.log.enter(Op::GetProfile)?;
        Ok(lock(&self.profiles)?.get(&user_id).cloned())
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, StorageError> {
        self.log.enter(Op::UpdateProfile)?;
        let mut guard = lock(&self.profiles)?;
        let current = guard.get(&user_id).ok_or(StorageError::NotFound)?;
        let next = current
            .merged(patch)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.insert(user_id, next.clone());
        Ok(next)
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<UserProfile>, StorageError> {
        self.log.enter(Op::FindByUsername)?;
        Ok(lock(&self.profiles)?
            .values()
            .find(|p| p.username().as_str().eq_ignore_ascii_case(username.as_str()))
            .cloned())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn insert_progress(&self, progress: &UserProgress) -> Result<(), StorageError> {
        self.log.enter(Op::InsertProgress)?;
        let mut guard = lock(&self.progress)?;
        if guard.contains_key(&progress.user_id()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(progress.user_id(), progress.clone());
        Ok(())
    }

    async fn get_progress(&self, user_id: UserId) -> Result<Option<UserProgress>, StorageError> {
        self.log.enter(Op::GetProgress)?;
        Ok(lock(&self.progress)?.get(&user_id).cloned())
    }

    async fn update_progress(
        &self,
        user_id: UserId,
        patch: &ProgressPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<UserProgress, StorageError> {
        self.log.enter(Op::UpdateProgress)?;
        let mut guard = lock(&self.progress)?;
        let current = guard.get(&user_id).ok_or(StorageError::NotFound)?;
        let next = current
            .merged(patch, updated_at)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.insert(user_id, next.clone());
        Ok(next)
    }
}

#[async_trait]
impl ContentRepository for InMemoryRepository {
    async fn list_words(&self, scope: &ContentScope) -> Result<Vec<Word>, StorageError> {
        self.log.enter(Op::ListWords)?;
        Ok(lock(&self.words)?
            .iter()
            .filter(|w| scope.admits(w.owner(), w.ages()))
            .cloned()
            .collect())
    }

    async fn list_books(&self, scope: &ContentScope) -> Result<Vec<Book>, StorageError> {
        self.log.enter(Op::ListBooks)?;
        Ok(lock(&self.books)?
            .iter()
            .filter(|b| scope.admits(b.owner(), b.ages()))
            .cloned()
            .collect())
    }

    async fn list_badges(&self, scope: &ContentScope) -> Result<Vec<Badge>, StorageError> {
        self.log.enter(Op::ListBadges)?;
        Ok(lock(&self.badges)?
            .iter()
            .filter(|(owner, _)| owner.visible_to(scope.user))
            .map(|(_, badge)| badge.clone())
            .collect())
    }

    async fn add_word(&self, owner: UserId, draft: &WordDraft) -> Result<Word, StorageError> {
        self.log.enter(Op::AddWord)?;
        let mut words = lock(&self.words)?;
        let next = words.iter().map(|w| w.id().value()).max().unwrap_or(0) + 1;
        let word = draft
            .clone()
            .into_word(WordId::new(next), ContentOwner::User(owner))
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        words.push(word.clone());
        Ok(word)
    }
}

#[async_trait]
impl UserBadgeRepository for InMemoryRepository {
    async fn list_unlocked(&self, user_id: UserId) -> Result<Vec<UnlockedBadge>, StorageError> {
        self.log.enter(Op::ListUnlocked)?;
        let mut rows = lock(&self.user_badges)?
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by(|a, b| b.unlocked_at.cmp(&a.unlocked_at));
        Ok(rows)
    }

    async fn record_unlock(
        &self,
        user_id: UserId,
        badge_id: BadgeId,
        unlocked_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.log.enter(Op::RecordUnlock)?;
        let mut all = lock(&self.user_badges)?;
        let rows = all.entry(user_id).or_default();
        if !rows.iter().any(|row| row.badge_id == badge_id) {
            rows.push(UnlockedBadge {
                badge_id,
                unlocked_at,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for InMemoryRepository {
    async fn read_token(&self, key: &str) -> Result<Option<AuthToken>, StorageError> {
        self.log.enter(Op::ReadToken)?;
        Ok(lock(&self.tokens)?.get(key).cloned())
    }

    async fn write_token(&self, key: &str, token: &AuthToken) -> Result<(), StorageError> {
        self.log.enter(Op::WriteToken)?;
        lock(&self.tokens)?.insert(key.to_owned(), token.clone());
        Ok(())
    }

    async fn clear_token(&self, key: &str) -> Result<(), StorageError> {
        self.log.enter(Op::ClearToken)?;
        lock(&self.tokens)?.remove(key);
        Ok(())
    }
}

#[async_trait]
impl ProgressCache for InMemoryRepository {
    async fn load_cached(&self, user_id: UserId) -> Result<Option<ProgressCounters>, StorageError> {
        Ok(lock(&self.cache)?.get(&user_id).copied())
    }

    async fn store_cached(&self, progress: &UserProgress) -> Result<(), StorageError> {
        lock(&self.cache)?.insert(progress.user_id(), *progress.counters());
        Ok(())
    }

    async fn clear_cached(&self, user_id: UserId) -> Result<(), StorageError> {
        lock(&self.cache)?.remove(&user_id);
        Ok(())
    }
}

impl Storage {
    /// Wire every collaborator to the given in-memory adapters.
    #[must_use]
    pub fn in_memory_with(identity: InMemoryIdentityProvider, repo: InMemoryRepository) -> Self {
        Self {
            identity: Arc::new(identity),
            profiles: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            content: Arc::new(repo.clone()),
            user_badges: Arc::new(repo.clone()),
            tokens: Arc::new(repo.clone()),
            progress_cache: Arc::new(repo),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::in_memory_with(InMemoryIdentityProvider::new(), InMemoryRepository::new())
    }
}
