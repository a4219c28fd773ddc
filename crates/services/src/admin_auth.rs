use std::sync::Arc;
use std::time::Duration;

use learn_core::model::AuthToken;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use storage::repository::{ADMIN_TOKEN_KEY, TokenStore};
use tracing::{info, warn};
use url::Url;

use crate::error::AdminAuthError;

/// Password login for the administrative screens, separate from learner identity.
#[derive(Clone)]
pub struct AdminAuthService {
    client: Client,
    base_url: Option<Url>,
    tokens: Arc<dyn TokenStore>,
}

impl AdminAuthService {
    /// # Errors
    ///
    /// Returns `AdminAuthError::Http` if the HTTP client cannot be built.
    pub fn new(
        base_url: Option<Url>,
        tokens: Arc<dyn TokenStore>,
        request_timeout: Duration,
    ) -> Result<Self, AdminAuthError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.base_url.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<String, AdminAuthError> {
        let base = self.base_url.as_ref().ok_or(AdminAuthError::Disabled)?;
        Ok(format!("{}/{path}", base.as_str().trim_end_matches('/')))
    }

    /// Exchange the admin password for a token and persist it.
    ///
    /// # Errors
    ///
    /// Returns `AdminAuthError` when disabled, the password is empty, the request
    /// fails or is rejected, or the token cannot be stored.
    pub async fn login(&self, password: &str) -> Result<AuthToken, AdminAuthError> {
        let url = self.endpoint("login")?;
        if password.is_empty() {
            return Err(AdminAuthError::EmptyPassword);
        }

        let response = self
            .client
            .post(url)
            .json(&LoginRequest { password })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AdminAuthError::HttpStatus(response.status()));
        }

        let body: LoginResponse = response.json().await?;
        let token = AuthToken::parse(body.token).map_err(|_| AdminAuthError::EmptyToken)?;
        self.tokens.write_token(ADMIN_TOKEN_KEY, &token).await?;
        info!("admin signed in");
        Ok(token)
    }

    /// Clear the stored token; the remote call is best effort.
    ///
    /// # Errors
    ///
    /// Returns `AdminAuthError::Storage` if the local token cannot be cleared.
    pub async fn logout(&self) -> Result<(), AdminAuthError> {
        if let (Some(token), Ok(url)) = (
            self.tokens.read_token(ADMIN_TOKEN_KEY).await?,
            self.endpoint("logout"),
        ) {
            match self
                .client
                .post(url)
                .bearer_auth(token.expose())
                .send()
                .await
            {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "admin logout rejected");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "admin logout request failed"),
            }
        }
        self.tokens.clear_token(ADMIN_TOKEN_KEY).await?;
        Ok(())
    }

    /// Whether the stored token is still accepted. Any failure clears it.
    pub async fn verify(&self) -> bool {
        let token = match self.tokens.read_token(ADMIN_TOKEN_KEY).await {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(err) => {
                warn!(error = %err, "could not read admin token");
                return false;
            }
        };

        let accepted = match self.endpoint("verify") {
            Ok(url) => match self
                .client
                .get(url)
                .bearer_auth(token.expose())
                .send()
                .await
            {
                Ok(response) => response.status().is_success(),
                Err(err) => {
                    warn!(error = %err, "admin verify request failed");
                    false
                }
            },
            Err(_) => false,
        };

        if !accepted {
            if let Err(err) = self.tokens.clear_token(ADMIN_TOKEN_KEY).await {
                warn!(error = %err, "could not clear admin token");
            }
        }
        accepted
    }

    /// # Errors
    ///
    /// Returns `AdminAuthError::Storage` if the token store cannot be read.
    pub async fn token(&self) -> Result<Option<AuthToken>, AdminAuthError> {
        Ok(self.tokens.read_token(ADMIN_TOKEN_KEY).await?)
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::InMemoryRepository;

    fn service(base_url: Option<&str>) -> (AdminAuthService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        let service = AdminAuthService::new(
            base_url.map(|u| Url::parse(u).unwrap()),
            Arc::new(repo.clone()),
            Duration::from_millis(500),
        )
        .unwrap();
        (service, repo)
    }

    #[tokio::test]
    async fn login_requires_configuration() {
        let (service, _) = service(None);
        assert!(!service.enabled());
        assert!(matches!(
            service.login("pw").await,
            Err(AdminAuthError::Disabled)
        ));
    }

    #[tokio::test]
    async fn empty_password_is_rejected_locally() {
        let (service, _) = service(Some("http://127.0.0.1:9"));
        assert!(matches!(
            service.login("").await,
            Err(AdminAuthError::EmptyPassword)
        ));
    }

    #[tokio::test]
    async fn verify_without_token_is_false() {
        let (service, _) = service(Some("http://127.0.0.1:9"));
        assert!(!service.verify().await);
    }

    #[tokio::test]
    async fn unverifiable_token_is_cleared() {
        let (service, repo) = service(Some("http://127.0.0.1:9"));
        let token = AuthToken::parse("stale").unwrap();
        repo.write_token(ADMIN_TOKEN_KEY, &token).await.unwrap();

        assert!(!service.verify().await);
        assert!(service.token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_clears_token_even_if_remote_fails() {
        let (service, repo) = service(Some("http://127.0.0.1:9"));
        let token = AuthToken::parse("live").unwrap();
        repo.write_token(ADMIN_TOKEN_KEY, &token).await.unwrap();

        service.logout().await.unwrap();
        assert!(service.token().await.unwrap().is_none());
    }
}
