use std::env;
use std::time::Duration;

use learn_core::model::DEFAULT_IDENTIFIER_DOMAIN;
use url::Url;

use crate::error::ConfigError;

pub const BACKEND_URL_VAR: &str = "WORDQUEST_BACKEND_URL";
pub const ANON_KEY_VAR: &str = "WORDQUEST_ANON_KEY";
pub const SERVICE_KEY_VAR: &str = "WORDQUEST_SERVICE_KEY";
pub const IDENTIFIER_DOMAIN_VAR: &str = "WORDQUEST_IDENTIFIER_DOMAIN";
pub const REQUEST_TIMEOUT_VAR: &str = "WORDQUEST_REQUEST_TIMEOUT_SECS";
pub const ADMIN_URL_VAR: &str = "WORDQUEST_ADMIN_URL";
pub const DB_URL_VAR: &str = "WORDQUEST_DB_URL";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_DB_URL: &str = "sqlite://wordquest.db?mode=rwc";

/// Everything needed to reach the hosted backend and the local store.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub backend_url: Url,
    pub anon_key: String,
    /// Admin credentials; registration rollback deletes identities with it.
    pub service_key: String,
    pub identifier_domain: String,
    pub request_timeout: Duration,
    pub admin_url: Option<Url>,
    pub database_url: String,
}

impl BackendConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`; blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let backend_url = parse_url(
            BACKEND_URL_VAR,
            &get(BACKEND_URL_VAR).ok_or(ConfigError::Missing(BACKEND_URL_VAR))?,
        )?;
        let anon_key = get(ANON_KEY_VAR).ok_or(ConfigError::Missing(ANON_KEY_VAR))?;
        let service_key = get(SERVICE_KEY_VAR).ok_or(ConfigError::Missing(SERVICE_KEY_VAR))?;
        let admin_url = get(ADMIN_URL_VAR)
            .map(|raw| parse_url(ADMIN_URL_VAR, &raw))
            .transpose()?;
        let request_timeout = get(REQUEST_TIMEOUT_VAR)
            .map(|raw| parse_timeout(&raw))
            .transpose()?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let identifier_domain = get(IDENTIFIER_DOMAIN_VAR)
            .map(|domain| domain.trim_start_matches('@').to_owned())
            .unwrap_or_else(|| DEFAULT_IDENTIFIER_DOMAIN.to_owned());

        Ok(Self {
            backend_url,
            anon_key,
            service_key,
            identifier_domain,
            request_timeout,
            admin_url,
            database_url: get(DB_URL_VAR).unwrap_or_else(|| DEFAULT_DB_URL.to_owned()),
        })
    }
}

/// Accepts only absolute `http`/`https` URLs.
///
/// # Errors
///
/// Returns `ConfigError` if the value does not parse or uses another scheme.
pub fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { var, source })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::UnsupportedScheme { var }),
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout {
            var: REQUEST_TIMEOUT_VAR,
            value: raw.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = BackendConfig::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "https://project.example.co"),
            (ANON_KEY_VAR, "anon"),
            (SERVICE_KEY_VAR, "service"),
        ]))
        .unwrap();
        assert_eq!(config.backend_url.as_str(), "https://project.example.co/");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.identifier_domain, DEFAULT_IDENTIFIER_DOMAIN);
        assert_eq!(config.database_url, DEFAULT_DB_URL);
        assert!(config.admin_url.is_none());
        assert_eq!(config.service_key, "service");
    }

    #[test]
    fn service_key_is_required() {
        let err = BackendConfig::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "https://project.example.co"),
            (ANON_KEY_VAR, "anon"),
            (SERVICE_KEY_VAR, " "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(SERVICE_KEY_VAR)));
    }

    #[test]
    fn missing_backend_url_is_reported() {
        let err = BackendConfig::from_lookup(lookup(&[(ANON_KEY_VAR, "anon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(BACKEND_URL_VAR)));
    }

    #[test]
    fn blank_anon_key_counts_as_missing() {
        let err = BackendConfig::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "https://project.example.co"),
            (ANON_KEY_VAR, "   "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ANON_KEY_VAR)));
    }

    #[test]
    fn rejects_bad_urls_and_timeouts() {
        let err = BackendConfig::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "not a url"),
            (ANON_KEY_VAR, "anon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let err = BackendConfig::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "ftp://files.example"),
            (ANON_KEY_VAR, "anon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));

        let err = BackendConfig::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "https://project.example.co"),
            (ANON_KEY_VAR, "anon"),
            (SERVICE_KEY_VAR, "service"),
            (REQUEST_TIMEOUT_VAR, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));
    }

    #[test]
    fn optional_values_are_read() {
        let config = BackendConfig::from_lookup(lookup(&[
            (BACKEND_URL_VAR, "https://project.example.co"),
            (ANON_KEY_VAR, "anon"),
            (SERVICE_KEY_VAR, "service"),
            (IDENTIFIER_DOMAIN_VAR, "@school.test"),
            (REQUEST_TIMEOUT_VAR, "3"),
            (ADMIN_URL_VAR, "http://localhost:4000"),
            (DB_URL_VAR, "sqlite::memory:"),
        ]))
        .unwrap();
        assert_eq!(config.identifier_domain, "school.test");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(
            config.admin_url.map(|u| u.to_string()),
            Some("http://localhost:4000/".to_owned())
        );
        assert_eq!(config.database_url, "sqlite::memory:");
    }
}
