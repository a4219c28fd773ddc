//! Learner events in, newly unlocked badges out.
//!
//! Each event is applied to a copy of the tracker; the copy replaces the live
//! tracker only after the store has acknowledged the new counters. Unlocks are
//! then recorded per learner.

use std::sync::Arc;

use learn_core::ProgressTracker;
use learn_core::model::{Badge, ProgressCounters, UserId};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::SessionError;
use crate::session_manager::SessionManager;

struct TrackerState {
    owner: Option<UserId>,
    catalog: Vec<Badge>,
    tracker: ProgressTracker,
}

pub struct ProgressService {
    sessions: Arc<SessionManager>,
    state: Mutex<TrackerState>,
}

impl ProgressService {
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>, catalog: Vec<Badge>) -> Self {
        Self {
            sessions,
            state: Mutex::new(TrackerState {
                owner: None,
                tracker: ProgressTracker::new(catalog.clone()),
                catalog,
            }),
        }
    }

    /// Swap the badge catalog, keeping current counters.
    pub async fn replace_catalog(&self, catalog: Vec<Badge>) {
        let mut state = self.state.lock().await;
        state.tracker = ProgressTracker::with_counters(*state.tracker.counters(), catalog.clone());
        state.catalog = catalog;
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` without a session, or the store
    /// error that prevented the counters from being saved.
    pub async fn answer_correct(&self) -> Result<Vec<Badge>, SessionError> {
        self.apply(ProgressTracker::record_quiz_correct).await
    }

    /// # Errors
    ///
    /// Same as [`ProgressService::answer_correct`].
    pub async fn answer_wrong(&self) -> Result<(), SessionError> {
        self.apply(|tracker| {
            tracker.record_quiz_miss();
            Vec::new()
        })
        .await
        .map(|_| ())
    }

    /// # Errors
    ///
    /// Same as [`ProgressService::answer_correct`].
    pub async fn puzzle_solved(&self) -> Result<Vec<Badge>, SessionError> {
        self.apply(ProgressTracker::record_puzzle_completion).await
    }

    /// # Errors
    ///
    /// Same as [`ProgressService::answer_correct`].
    pub async fn word_learned(&self) -> Result<(), SessionError> {
        self.apply(|tracker| {
            tracker.record_word_learned();
            Vec::new()
        })
        .await
        .map(|_| ())
    }

    /// # Errors
    ///
    /// Same as [`ProgressService::answer_correct`].
    pub async fn book_read(&self) -> Result<(), SessionError> {
        self.apply(|tracker| {
            tracker.record_book_read();
            Vec::new()
        })
        .await
        .map(|_| ())
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` without a session.
    pub async fn counters(&self) -> Result<ProgressCounters, SessionError> {
        let state = self.synced().await?;
        Ok(*state.tracker.counters())
    }

    /// The full catalog with unlock flags.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` without a session.
    pub async fn badges(&self) -> Result<Vec<Badge>, SessionError> {
        let state = self.synced().await?;
        Ok(state.tracker.badges().to_vec())
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` without a session.
    pub async fn next_badge(&self) -> Result<Option<(Badge, u32)>, SessionError> {
        let state = self.synced().await?;
        Ok(state
            .tracker
            .next_badge()
            .map(|badge| (badge.clone(), state.tracker.remaining_for(badge))))
    }

    async fn apply<F>(&self, event: F) -> Result<Vec<Badge>, SessionError>
    where
        F: FnOnce(&mut ProgressTracker) -> Vec<Badge>,
    {
        let mut state = self.synced().await?;
        let mut draft = state.tracker.clone();
        let unlocked = event(&mut draft);

        if draft.counters() != state.tracker.counters() {
            let saved = self
                .sessions
                .update_progress(draft.counters().to_patch())
                .await?;
            if saved.counters() != draft.counters() {
                draft = ProgressTracker::with_counters(*saved.counters(), state.catalog.clone());
            }
        }

        for badge in &unlocked {
            info!(badge = badge.name(), category = badge.category().as_str(), "badge unlocked");
        }
        state.tracker = draft;
        if let Some(owner) = state.owner {
            if !unlocked.is_empty() {
                self.sessions.record_unlocks(owner, &unlocked).await;
            }
        }
        Ok(unlocked)
    }

    /// Lock the tracker, rebuilding it when the learner or their stored counters changed.
    async fn synced(&self) -> Result<MutexGuard<'_, TrackerState>, SessionError> {
        let session = self
            .sessions
            .session()
            .await
            .ok_or(SessionError::NotAuthenticated)?;
        let mut state = self.state.lock().await;
        if state.owner != Some(session.user_id())
            || state.tracker.counters() != session.progress().counters()
        {
            state.tracker = ProgressTracker::with_counters(
                *session.progress().counters(),
                state.catalog.clone(),
            );
            state.owner = Some(session.user_id());
        }
        Ok(state)
    }
}
