use thiserror::Error;

use crate::model::{
    BadgeError, ContentError, CredentialError, ProfileError, ProgressError, SessionDataError,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Badge(#[from] BadgeError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Session(#[from] SessionDataError),
}
