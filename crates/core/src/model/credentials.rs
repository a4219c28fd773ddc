use std::fmt;

use thiserror::Error;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;
pub const PASSWORD_MIN_LEN: usize = 6;

/// Default domain appended to usernames to form provider login identifiers.
pub const DEFAULT_IDENTIFIER_DOMAIN: &str = "wordquest.local";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CredentialError {
    #[error("username must be 3-20 characters of letters, digits or underscore")]
    InvalidUsername,

    #[error("password must be at least 6 characters")]
    PasswordTooShort,

    #[error("session token cannot be empty")]
    EmptyToken,
}

/// Human-chosen login name, `^[A-Za-z0-9_]{3,20}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// # Errors
    ///
    /// Returns `CredentialError::InvalidUsername` if the shape does not match.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CredentialError> {
        let raw = raw.into();
        let len = raw.chars().count();
        let shape_ok = (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len)
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !shape_ok {
            return Err(CredentialError::InvalidUsername);
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Provider-facing login handle for this username.
    ///
    /// Lowercased so that `Kid_1` and `kid_1` collide at the provider.
    #[must_use]
    pub fn synthetic_identifier(&self, domain: &str) -> String {
        format!("{}@{}", self.0.to_ascii_lowercase(), domain.trim_start_matches('@'))
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plain-text password held only long enough to hand to the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// # Errors
    ///
    /// Returns `CredentialError::PasswordTooShort` below the minimum length.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CredentialError> {
        let raw = raw.into();
        if raw.chars().count() < PASSWORD_MIN_LEN {
            return Err(CredentialError::PasswordTooShort);
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Opaque session token issued by the identity provider or the admin endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// # Errors
    ///
    /// Returns `CredentialError::EmptyToken` for blank input.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CredentialError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_accepts_boundaries() {
        assert!(Username::parse("abc").is_ok());
        assert!(Username::parse("a".repeat(20)).is_ok());
        assert!(Username::parse("valid_user1").is_ok());
    }

    #[test]
    fn username_rejects_bad_shapes() {
        let too_long = "a".repeat(21);
        for raw in ["ab", "", too_long.as_str(), "has space", "dash-ed", "émile", "user!"] {
            assert_eq!(
                Username::parse(raw).unwrap_err(),
                CredentialError::InvalidUsername,
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn synthetic_identifier_is_lowercase_address() {
        let name = Username::parse("Kid_One").unwrap();
        assert_eq!(name.synthetic_identifier("wordquest.local"), "kid_one@wordquest.local");
        assert_eq!(name.synthetic_identifier("@example.org"), "kid_one@example.org");
    }

    #[test]
    fn password_length_rule() {
        assert_eq!(
            Password::parse("short").unwrap_err(),
            CredentialError::PasswordTooShort
        );
        assert!(Password::parse("sixsix").is_ok());
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let password = Password::parse("hunter22").unwrap();
        let token = AuthToken::parse("abc.def").unwrap();
        assert_eq!(format!("{password:?}"), "Password(***)");
        assert_eq!(format!("{token:?}"), "AuthToken(***)");
    }

    #[test]
    fn token_rejects_blank() {
        assert_eq!(AuthToken::parse("   ").unwrap_err(), CredentialError::EmptyToken);
    }
}
