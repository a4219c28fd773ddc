mod badge;
mod catalog;
mod credentials;
mod ids;
mod profile;
mod progress;
mod session;

pub use ids::{BadgeId, BookId, ParseIdError, UserId, WordId};

pub use badge::{Badge, BadgeCategory, BadgeError, BadgePatch};
pub use catalog::{
    AgeRange, Book, BookPage, ContentError, ContentOwner, ContentScope, Word, WordDraft,
    words_by_category,
};
pub use credentials::{
    AuthToken, CredentialError, DEFAULT_IDENTIFIER_DOMAIN, PASSWORD_MIN_LEN, Password,
    USERNAME_MAX_LEN, USERNAME_MIN_LEN, Username,
};
pub use profile::{
    CHILD_AGE_MAX, CHILD_AGE_MIN, DEFAULT_SITE_NAME, ProfileError, ProfilePatch, UserProfile,
    UserType,
};
pub use progress::{ProgressCounters, ProgressError, ProgressPatch, UserProgress};
pub use session::{Session, SessionDataError};
