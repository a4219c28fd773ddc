//! User-visible messages, kept apart from the error codes control flow uses.

use std::fmt;

/// Stable identifier for every failure a learner can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidUsername,
    InvalidPassword,
    InvalidChildAge,
    InvalidProfile,
    InvalidProgress,
    DuplicateUsername,
    InvalidCredentials,
    PermissionDenied,
    TransientStore,
    NotAuthenticated,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUsername => "validation.username",
            Self::InvalidPassword => "validation.password",
            Self::InvalidChildAge => "validation.child_age",
            Self::InvalidProfile => "validation.profile",
            Self::InvalidProgress => "validation.progress",
            Self::DuplicateUsername => "auth.duplicate_username",
            Self::InvalidCredentials => "auth.invalid_credentials",
            Self::PermissionDenied => "auth.permission_denied",
            Self::TransientStore => "store.unavailable",
            Self::NotAuthenticated => "auth.not_authenticated",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl Locale {
    /// Accepts tags like `es`, `es-MX` or `es_ES.UTF-8`; anything unknown is English.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let language = tag
            .split(['-', '_', '.'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match language.as_str() {
            "es" => Self::Es,
            _ => Self::En,
        }
    }
}

#[must_use]
pub fn message(code: ErrorCode, locale: Locale) -> &'static str {
    match locale {
        Locale::En => english(code),
        Locale::Es => spanish(code),
    }
}

fn english(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidUsername => {
            "Usernames are 3 to 20 letters, numbers or underscores."
        }
        ErrorCode::InvalidPassword => "Passwords need at least 6 characters.",
        ErrorCode::InvalidChildAge => "Please choose an age between 1 and 18.",
        ErrorCode::InvalidProfile => "Some profile details are not valid.",
        ErrorCode::InvalidProgress => "That progress update is not allowed.",
        ErrorCode::DuplicateUsername => "That username is already taken.",
        ErrorCode::InvalidCredentials => "Wrong username or password.",
        ErrorCode::PermissionDenied => "You are not allowed to do that.",
        ErrorCode::TransientStore => "We could not reach the server. Please try again.",
        ErrorCode::NotAuthenticated => "Please sign in first.",
    }
}

fn spanish(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidUsername => {
            "El nombre de usuario debe tener de 3 a 20 letras, números o guiones bajos."
        }
        ErrorCode::InvalidPassword => "La contraseña necesita al menos 6 caracteres.",
        ErrorCode::InvalidChildAge => "Elige una edad entre 1 y 18.",
        ErrorCode::InvalidProfile => "Algunos datos del perfil no son válidos.",
        ErrorCode::InvalidProgress => "Esa actualización de progreso no está permitida.",
        ErrorCode::DuplicateUsername => "Ese nombre de usuario ya está en uso.",
        ErrorCode::InvalidCredentials => "Usuario o contraseña incorrectos.",
        ErrorCode::PermissionDenied => "No tienes permiso para hacer eso.",
        ErrorCode::TransientStore => "No pudimos conectar con el servidor. Inténtalo de nuevo.",
        ErrorCode::NotAuthenticated => "Primero inicia sesión.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 10] = [
        ErrorCode::InvalidUsername,
        ErrorCode::InvalidPassword,
        ErrorCode::InvalidChildAge,
        ErrorCode::InvalidProfile,
        ErrorCode::InvalidProgress,
        ErrorCode::DuplicateUsername,
        ErrorCode::InvalidCredentials,
        ErrorCode::PermissionDenied,
        ErrorCode::TransientStore,
        ErrorCode::NotAuthenticated,
    ];

    #[test]
    fn every_code_has_distinct_translations() {
        for code in ALL {
            let en = message(code, Locale::En);
            let es = message(code, Locale::Es);
            assert!(!en.is_empty());
            assert_ne!(en, es, "{code} is untranslated");
        }
    }

    #[test]
    fn locale_tags_fall_back_to_english() {
        assert_eq!(Locale::from_tag("es-MX"), Locale::Es);
        assert_eq!(Locale::from_tag("es_ES.UTF-8"), Locale::Es);
        assert_eq!(Locale::from_tag("fr"), Locale::En);
        assert_eq!(Locale::from_tag(""), Locale::En);
    }
}
