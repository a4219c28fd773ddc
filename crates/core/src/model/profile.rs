use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::credentials::{CredentialError, Username};
use crate::model::ids::UserId;

pub const CHILD_AGE_MIN: u8 = 1;
pub const CHILD_AGE_MAX: u8 = 18;
pub const DEFAULT_SITE_NAME: &str = "Word Quest";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProfileError {
    #[error(transparent)]
    Username(#[from] CredentialError),

    #[error("child age must be between 1 and 18, got {0}")]
    InvalidChildAge(u8),

    #[error("unknown user type: {0}")]
    UnknownUserType(String),
}

/// The adult role that owns a learner account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserType {
    Teacher,
    Director,
    Parent,
}

impl UserType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Teacher => "teacher",
            UserType::Director => "director",
            UserType::Parent => "parent",
        }
    }

    /// # Errors
    ///
    /// Returns `ProfileError::UnknownUserType` for unrecognized values.
    pub fn parse(raw: &str) -> Result<Self, ProfileError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Self::Teacher),
            "director" => Ok(Self::Director),
            "parent" => Ok(Self::Parent),
            other => Err(ProfileError::UnknownUserType(other.to_owned())),
        }
    }
}

fn check_child_age(age: u8) -> Result<u8, ProfileError> {
    if (CHILD_AGE_MIN..=CHILD_AGE_MAX).contains(&age) {
        Ok(age)
    } else {
        Err(ProfileError::InvalidChildAge(age))
    }
}

fn normalize_site_name(raw: Option<String>) -> String {
    raw.map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SITE_NAME.to_owned())
}

/// Account profile created alongside the identity at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    user_id: UserId,
    username: Username,
    user_type: UserType,
    child_age: u8,
    site_name: String,
    created_at: DateTime<Utc>,
}

impl UserProfile {
    /// # Errors
    ///
    /// Returns `ProfileError::InvalidChildAge` if the age is out of range.
    pub fn new(
        user_id: UserId,
        username: Username,
        user_type: UserType,
        child_age: u8,
        site_name: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ProfileError> {
        Ok(Self {
            user_id,
            username,
            user_type,
            child_age: check_child_age(child_age)?,
            site_name: normalize_site_name(site_name),
            created_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn username(&self) -> &Username {
        &self.username
    }

    #[must_use]
    pub fn user_type(&self) -> UserType {
        self.user_type
    }

    #[must_use]
    pub fn child_age(&self) -> u8 {
        self.child_age
    }

    #[must_use]
    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns a copy with `patch` applied. `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError` if the patched values fail validation.
    pub fn merged(&self, patch: &ProfilePatch) -> Result<Self, ProfileError> {
        let mut next = self.clone();
        if let Some(user_type) = patch.user_type {
            next.user_type = user_type;
        }
        if let Some(age) = patch.child_age {
            next.child_age = check_child_age(age)?;
        }
        if let Some(site_name) = patch.site_name.clone() {
            next.site_name = normalize_site_name(Some(site_name));
        }
        Ok(next)
    }
}

/// Partial profile update. Usernames are fixed once registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub user_type: Option<UserType>,
    pub child_age: Option<u8>,
    pub site_name: Option<String>,
}

impl ProfilePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// # Errors
    ///
    /// Returns `ProfileError::InvalidChildAge` if the patch carries a bad age.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if let Some(age) = self.child_age {
            check_child_age(age)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn profile() -> UserProfile {
        UserProfile::new(
            UserId::random(),
            Username::parse("kid_one").unwrap(),
            UserType::Parent,
            7,
            None,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn blank_site_name_falls_back_to_default() {
        let p = profile();
        assert_eq!(p.site_name(), DEFAULT_SITE_NAME);
    }

    #[test]
    fn rejects_out_of_range_age() {
        let err = UserProfile::new(
            UserId::random(),
            Username::parse("kid_one").unwrap(),
            UserType::Teacher,
            0,
            Some("School".into()),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, ProfileError::InvalidChildAge(0));
    }

    #[test]
    fn merged_leaves_original_untouched() {
        let p = profile();
        let next = p
            .merged(&ProfilePatch {
                child_age: Some(9),
                site_name: Some("  Maple Class ".into()),
                ..ProfilePatch::default()
            })
            .unwrap();
        assert_eq!(p.child_age(), 7);
        assert_eq!(next.child_age(), 9);
        assert_eq!(next.site_name(), "Maple Class");
        assert_eq!(next.username(), p.username());
    }

    #[test]
    fn patch_validate_catches_bad_age() {
        let patch = ProfilePatch {
            child_age: Some(42),
            ..ProfilePatch::default()
        };
        assert_eq!(patch.validate().unwrap_err(), ProfileError::InvalidChildAge(42));
    }

    #[test]
    fn user_type_parse_is_case_insensitive() {
        assert_eq!(UserType::parse("Director").unwrap(), UserType::Director);
        assert!(UserType::parse("student").is_err());
    }
}
