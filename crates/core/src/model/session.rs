use thiserror::Error;

use crate::model::ids::UserId;
use crate::model::profile::UserProfile;
use crate::model::progress::UserProgress;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionDataError {
    #[error("profile belongs to {profile} but progress belongs to {progress}")]
    OwnerMismatch { profile: UserId, progress: UserId },
}

/// An authenticated learner: profile and progress always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    profile: UserProfile,
    progress: UserProgress,
}

impl Session {
    /// # Errors
    ///
    /// Returns `SessionDataError::OwnerMismatch` if the two records belong to different users.
    pub fn new(profile: UserProfile, progress: UserProgress) -> Result<Self, SessionDataError> {
        if profile.user_id() != progress.user_id() {
            return Err(SessionDataError::OwnerMismatch {
                profile: profile.user_id(),
                progress: progress.user_id(),
            });
        }
        Ok(Self { profile, progress })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.profile.user_id()
    }

    #[must_use]
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    #[must_use]
    pub fn progress(&self) -> &UserProgress {
        &self.progress
    }

    pub(crate) fn replace_profile(&mut self, profile: UserProfile) {
        debug_assert_eq!(profile.user_id(), self.user_id());
        self.profile = profile;
    }

    pub(crate) fn replace_progress(&mut self, progress: UserProgress) {
        debug_assert_eq!(progress.user_id(), self.user_id());
        self.progress = progress;
    }

    /// Swap in a newer profile for the same user.
    ///
    /// # Errors
    ///
    /// Returns `SessionDataError::OwnerMismatch` if the profile is for someone else.
    pub fn with_profile(mut self, profile: UserProfile) -> Result<Self, SessionDataError> {
        if profile.user_id() != self.user_id() {
            return Err(SessionDataError::OwnerMismatch {
                profile: profile.user_id(),
                progress: self.user_id(),
            });
        }
        self.replace_profile(profile);
        Ok(self)
    }

    /// Swap in newer progress for the same user.
    ///
    /// # Errors
    ///
    /// Returns `SessionDataError::OwnerMismatch` if the progress is for someone else.
    pub fn with_progress(mut self, progress: UserProgress) -> Result<Self, SessionDataError> {
        if progress.user_id() != self.user_id() {
            return Err(SessionDataError::OwnerMismatch {
                profile: self.user_id(),
                progress: progress.user_id(),
            });
        }
        self.replace_progress(progress);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::credentials::Username;
    use crate::model::profile::UserType;
    use crate::time::fixed_now;

    fn profile(user: UserId) -> UserProfile {
        UserProfile::new(
            user,
            Username::parse("reader_7").unwrap(),
            UserType::Teacher,
            6,
            None,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_owners() {
        let a = UserId::random();
        let b = UserId::random();
        let err = Session::new(profile(a), UserProgress::initial(b, fixed_now())).unwrap_err();
        assert_eq!(
            err,
            SessionDataError::OwnerMismatch {
                profile: a,
                progress: b
            }
        );
    }

    #[test]
    fn with_progress_swaps_same_owner() {
        let a = UserId::random();
        let session = Session::new(profile(a), UserProgress::initial(a, fixed_now())).unwrap();
        let other = UserProgress::initial(UserId::random(), fixed_now());
        assert!(session.clone().with_progress(other).is_err());
        let same = UserProgress::initial(a, fixed_now());
        assert!(session.with_progress(same).is_ok());
    }
}
