//! Shared error types for the services crate.

use std::fmt;

use thiserror::Error;

use learn_core::model::{ContentError, CredentialError, ProfileError, ProgressError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::messages::ErrorCode;

/// Input field a validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationField {
    Username,
    Password,
    ChildAge,
    UserType,
    SiteName,
    Progress,
}

impl fmt::Display for ValidationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Username => "username",
            Self::Password => "password",
            Self::ChildAge => "child age",
            Self::UserType => "user type",
            Self::SiteName => "site name",
            Self::Progress => "progress",
        })
    }
}

/// Errors emitted by `SessionManager` and the services built on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("invalid {field}")]
    Validation { field: ValidationField },
    #[error("username is already taken")]
    DuplicateUsername,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("permission denied")]
    PermissionDenied,
    #[error("store unavailable: {0}")]
    TransientStore(String),
    #[error("not signed in")]
    NotAuthenticated,
}

impl SessionError {
    #[must_use]
    pub fn validation(field: ValidationField) -> Self {
        Self::Validation { field }
    }

    /// Safe to retry without changing the input.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// Stable code for presentation; never derived from message text.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { field } => match field {
                ValidationField::Username => ErrorCode::InvalidUsername,
                ValidationField::Password => ErrorCode::InvalidPassword,
                ValidationField::ChildAge => ErrorCode::InvalidChildAge,
                ValidationField::UserType | ValidationField::SiteName => ErrorCode::InvalidProfile,
                ValidationField::Progress => ErrorCode::InvalidProgress,
            },
            Self::DuplicateUsername => ErrorCode::DuplicateUsername,
            Self::InvalidCredentials => ErrorCode::InvalidCredentials,
            Self::PermissionDenied => ErrorCode::PermissionDenied,
            Self::TransientStore(_) => ErrorCode::TransientStore,
            Self::NotAuthenticated => ErrorCode::NotAuthenticated,
        }
    }

    /// Mapping for identity creation, where a uniqueness conflict means the
    /// username is taken.
    pub(crate) fn from_sign_up(err: StorageError) -> Self {
        match err {
            StorageError::Conflict => Self::DuplicateUsername,
            other => other.into(),
        }
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PermissionDenied => Self::PermissionDenied,
            StorageError::InvalidCredentials => Self::InvalidCredentials,
            other => Self::TransientStore(other.to_string()),
        }
    }
}

impl From<CredentialError> for SessionError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::PasswordTooShort => Self::validation(ValidationField::Password),
            _ => Self::validation(ValidationField::Username),
        }
    }
}

impl From<ProfileError> for SessionError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::Username(inner) => inner.into(),
            ProfileError::InvalidChildAge(_) => Self::validation(ValidationField::ChildAge),
            _ => Self::validation(ValidationField::UserType),
        }
    }
}

impl From<ProgressError> for SessionError {
    fn from(_: ProgressError) -> Self {
        Self::validation(ValidationField::Progress)
    }
}

/// Errors emitted by `ContentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentServiceError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("invalid word: {0}")]
    InvalidWord(#[from] ContentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AdminAuthService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdminAuthError {
    #[error("admin endpoint is not configured")]
    Disabled,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("admin endpoint returned no token")]
    EmptyToken,
    #[error("admin request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{var} must be an http(s) URL")]
    UnsupportedScheme { var: &'static str },
    #[error("{var} must be a positive number of seconds, got {value:?}")]
    InvalidTimeout { var: &'static str, value: String },
}

/// Errors emitted while bootstrapping the app context.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppContextError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    AdminAuth(#[from] AdminAuthError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
