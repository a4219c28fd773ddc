use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::badge::BadgeCategory;
use crate::model::ids::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("{counter} cannot go from {current} down to {requested}")]
    Regression {
        counter: &'static str,
        current: u32,
        requested: u32,
    },
}

/// Learner activity counters.
///
/// Every counter except `quiz_streak` only grows. Increments saturate at `u32::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    quiz_score: u32,
    quiz_streak: u32,
    puzzle_completions: u32,
    words_learned: u32,
    books_read: u32,
}

impl ProgressCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_persisted(
        quiz_score: u32,
        quiz_streak: u32,
        puzzle_completions: u32,
        words_learned: u32,
        books_read: u32,
    ) -> Self {
        Self {
            quiz_score,
            quiz_streak,
            puzzle_completions,
            words_learned,
            books_read,
        }
    }

    #[must_use]
    pub fn quiz_score(&self) -> u32 {
        self.quiz_score
    }

    #[must_use]
    pub fn quiz_streak(&self) -> u32 {
        self.quiz_streak
    }

    #[must_use]
    pub fn puzzle_completions(&self) -> u32 {
        self.puzzle_completions
    }

    #[must_use]
    pub fn words_learned(&self) -> u32 {
        self.words_learned
    }

    #[must_use]
    pub fn books_read(&self) -> u32 {
        self.books_read
    }

    /// The counter a badge of `category` is measured against.
    #[must_use]
    pub fn counter_for(&self, category: BadgeCategory) -> u32 {
        match category {
            BadgeCategory::Quiz => self.quiz_score,
            BadgeCategory::Puzzle => self.puzzle_completions,
        }
    }

    pub(crate) fn bump_quiz(&mut self) {
        self.quiz_score = self.quiz_score.saturating_add(1);
        self.quiz_streak = self.quiz_streak.saturating_add(1);
    }

    pub(crate) fn reset_streak(&mut self) {
        self.quiz_streak = 0;
    }

    pub(crate) fn bump_puzzles(&mut self) {
        self.puzzle_completions = self.puzzle_completions.saturating_add(1);
    }

    pub(crate) fn bump_words(&mut self) {
        self.words_learned = self.words_learned.saturating_add(1);
    }

    pub(crate) fn bump_books(&mut self) {
        self.books_read = self.books_read.saturating_add(1);
    }

    /// Returns the counters with `patch` merged in.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Regression` if the patch would lower a monotonic counter.
    pub fn merged(&self, patch: &ProgressPatch) -> Result<Self, ProgressError> {
        fn forward(
            counter: &'static str,
            current: u32,
            requested: Option<u32>,
        ) -> Result<u32, ProgressError> {
            match requested {
                Some(requested) if requested < current => Err(ProgressError::Regression {
                    counter,
                    current,
                    requested,
                }),
                Some(requested) => Ok(requested),
                None => Ok(current),
            }
        }

        Ok(Self {
            quiz_score: forward("quiz_score", self.quiz_score, patch.quiz_score)?,
            quiz_streak: patch.quiz_streak.unwrap_or(self.quiz_streak),
            puzzle_completions: forward(
                "puzzle_completions",
                self.puzzle_completions,
                patch.puzzle_completions,
            )?,
            words_learned: forward("words_learned", self.words_learned, patch.words_learned)?,
            books_read: forward("books_read", self.books_read, patch.books_read)?,
        })
    }

    /// A patch that sets every field to this value.
    #[must_use]
    pub fn to_patch(&self) -> ProgressPatch {
        ProgressPatch {
            quiz_score: Some(self.quiz_score),
            quiz_streak: Some(self.quiz_streak),
            puzzle_completions: Some(self.puzzle_completions),
            words_learned: Some(self.words_learned),
            books_read: Some(self.books_read),
        }
    }
}

/// Partial update for stored progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressPatch {
    pub quiz_score: Option<u32>,
    pub quiz_streak: Option<u32>,
    pub puzzle_completions: Option<u32>,
    pub words_learned: Option<u32>,
    pub books_read: Option<u32>,
}

impl ProgressPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Progress record owned by a single learner identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProgress {
    user_id: UserId,
    counters: ProgressCounters,
    updated_at: DateTime<Utc>,
}

impl UserProgress {
    /// Zero-valued progress for a freshly registered (or healed) learner.
    #[must_use]
    pub fn initial(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            counters: ProgressCounters::new(),
            updated_at: now,
        }
    }

    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        counters: ProgressCounters,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            counters,
            updated_at,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// # Errors
    ///
    /// Returns `ProgressError::Regression` if the patch would lower a monotonic counter.
    pub fn merged(&self, patch: &ProgressPatch, now: DateTime<Utc>) -> Result<Self, ProgressError> {
        Ok(Self {
            user_id: self.user_id,
            counters: self.counters.merged(patch)?,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn counter_for_maps_categories() {
        let counters = ProgressCounters::from_persisted(7, 2, 3, 0, 0);
        assert_eq!(counters.counter_for(BadgeCategory::Quiz), 7);
        assert_eq!(counters.counter_for(BadgeCategory::Puzzle), 3);
    }

    #[test]
    fn merged_rejects_regression() {
        let counters = ProgressCounters::from_persisted(5, 1, 0, 0, 0);
        let err = counters
            .merged(&ProgressPatch {
                quiz_score: Some(4),
                ..ProgressPatch::default()
            })
            .unwrap_err();
        assert_eq!(
            err,
            ProgressError::Regression {
                counter: "quiz_score",
                current: 5,
                requested: 4,
            }
        );
    }

    #[test]
    fn merged_allows_streak_reset() {
        let counters = ProgressCounters::from_persisted(5, 4, 0, 0, 0);
        let merged = counters
            .merged(&ProgressPatch {
                quiz_streak: Some(0),
                words_learned: Some(2),
                ..ProgressPatch::default()
            })
            .unwrap();
        assert_eq!(merged.quiz_streak(), 0);
        assert_eq!(merged.quiz_score(), 5);
        assert_eq!(merged.words_learned(), 2);
    }

    #[test]
    fn increments_saturate() {
        let mut counters = ProgressCounters::from_persisted(u32::MAX, u32::MAX, 0, 0, 0);
        counters.bump_quiz();
        assert_eq!(counters.quiz_score(), u32::MAX);
        assert_eq!(counters.quiz_streak(), u32::MAX);
    }

    #[test]
    fn to_patch_round_trips_through_merge() {
        let counters = ProgressCounters::from_persisted(3, 1, 2, 9, 4);
        let merged = ProgressCounters::new().merged(&counters.to_patch()).unwrap();
        assert_eq!(merged, counters);
    }

    #[test]
    fn initial_progress_is_zeroed() {
        let user = UserId::random();
        let progress = UserProgress::initial(user, fixed_now());
        assert_eq!(progress.user_id(), user);
        assert_eq!(*progress.counters(), ProgressCounters::default());
        assert!(ProgressPatch::default().is_empty());
    }
}
