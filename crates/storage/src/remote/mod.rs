//! Hosted backend adapter: auth endpoints under `/auth/v1`, tables under `/rest/v1`.

mod errors;
mod rows;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{
    AuthToken, Badge, BadgeId, Book, ContentScope, Password, ProfilePatch, ProgressPatch, UserId,
    UserProfile, UserProgress, Username, Word, WordDraft,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::repository::{
    ContentRepository, IdentityProvider, ProfileRepository, ProgressRepository, SignedIn, Storage,
    StorageError, UnlockedBadge, UserBadgeRepository,
};
use crate::sqlite::SqliteRepository;

use errors::{ErrorBody, classify, from_transport};
use rows::{
    BadgeRow, BookRow, NewWordRow, ProfilePatchBody, ProfileRow, ProgressPatchBody, ProgressRow,
    UserBadgeRow, WordRow,
};

const PROFILES: &str = "user_profiles";
const PROGRESS: &str = "user_progress";
const WORDS: &str = "words";
const BOOKS: &str = "books";
const BADGES: &str = "badges";
const USER_BADGES: &str = "user_badges";

/// Connection settings for the hosted backend.
#[derive(Clone, Debug)]
pub struct RestConfig {
    pub base_url: String,
    pub anon_key: String,
    /// Privileged key for the admin endpoints. Without it identities cannot be
    /// deleted and registration rollback fails with `PermissionDenied`.
    pub service_key: Option<String>,
    pub timeout: Duration,
}

/// Client for the hosted backend.
///
/// Holds the signed-in user's access token so table requests run under that
/// user's row-level policies.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    config: RestConfig,
    access_token: Arc<Mutex<Option<AuthToken>>>,
}

impl RestBackend {
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the HTTP client cannot be built.
    pub fn new(config: RestConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            config,
            access_token: Arc::new(Mutex::new(None)),
        })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base())
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base())
    }

    fn current_token(&self) -> Result<Option<AuthToken>, StorageError> {
        self.access_token
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| StorageError::Connection("token lock poisoned".into()))
    }

    fn set_token(&self, token: Option<AuthToken>) -> Result<(), StorageError> {
        let mut guard = self
            .access_token
            .lock()
            .map_err(|_| StorageError::Connection("token lock poisoned".into()))?;
        *guard = token;
        Ok(())
    }

    /// Attach the api key and the best bearer available.
    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, StorageError> {
        let builder = builder.header("apikey", &self.config.anon_key);
        Ok(match self.current_token()? {
            Some(token) => builder.bearer_auth(token.expose()),
            None => builder.bearer_auth(&self.config.anon_key),
        })
    }

    async fn dispatch(&self, builder: RequestBuilder) -> Result<Response, StorageError> {
        let response = builder.send().await.map_err(|e| from_transport(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        let err = classify(status, &body);
        tracing::debug!(%status, error = %err, "backend request failed");
        Err(err)
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, StorageError> {
        let response = self.dispatch(builder).await?;
        response.json::<T>().await.map_err(|e| from_transport(&e))
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), StorageError> {
        self.dispatch(builder).await.map(|_| ())
    }

    fn select_request(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<RequestBuilder, StorageError> {
        Ok(self
            .authed(self.client.get(self.table_url(table)))?
            .query(query)
            .query(&[("select", "*"), ("limit", "1")]))
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, StorageError> {
        let request = self.select_request(table, query)?;
        match self.fetch::<Vec<T>>(request).await {
            Ok(rows) => Ok(rows.into_iter().next()),
            Err(StorageError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn insert_row<T: Serialize + Sync>(&self, table: &str, row: &T) -> Result<(), StorageError> {
        let request = self
            .authed(self.client.post(self.table_url(table)))?
            .header("Prefer", "return=minimal")
            .json(row);
        self.send_empty(request).await
    }

    async fn patch_row<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        key: (&str, String),
        body: &B,
    ) -> Result<T, StorageError> {
        let request = self
            .authed(self.client.patch(self.table_url(table)))?
            .query(&[key])
            .header("Prefer", "return=representation")
            .json(body);
        self.fetch::<Vec<T>>(request)
            .await?
            .into_iter()
            .next()
            .ok_or(StorageError::NotFound)
    }

    /// Global rows plus the scope user's own, for the scope's age, newest first.
    fn scoped_query(select: &str, scope: &ContentScope) -> Vec<(&'static str, String)> {
        vec![
            ("select", select.to_owned()),
            (
                "or",
                format!("(owner_type.eq.global,owner_id.eq.{})", scope.user),
            ),
            ("min_age", format!("lte.{}", scope.child_age)),
            ("max_age", format!("gte.{}", scope.child_age)),
            ("order", "created_at.desc".to_owned()),
        ]
    }

    fn delete_user_request(&self, user_id: UserId) -> Result<RequestBuilder, StorageError> {
        let Some(service_key) = &self.config.service_key else {
            return Err(StorageError::PermissionDenied);
        };
        Ok(self
            .client
            .delete(self.auth_url(&format!("admin/users/{user_id}")))
            .header("apikey", service_key)
            .bearer_auth(service_key))
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Case-insensitive exact match: `%` and `_` are literals, not wildcards.
fn ilike_exact(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 8);
    pattern.push_str("ilike.");
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern
}

// ─── Auth wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthUser {
    id: UserId,
}

#[derive(Deserialize)]
struct SignUpResponse {
    #[serde(default)]
    user: Option<AuthUser>,
    #[serde(default)]
    id: Option<UserId>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

// ─── Identity ─────────────────────────────────────────────────────────────────

#[async_trait]
impl IdentityProvider for RestBackend {
    async fn sign_up(&self, identifier: &str, password: &Password) -> Result<UserId, StorageError> {
        let request = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", &self.config.anon_key)
            .json(&PasswordGrant {
                email: identifier,
                password: password.expose(),
            });
        let response: SignUpResponse = self.fetch(request).await?;
        // Depending on confirmation settings the user is either nested or top level.
        response
            .user
            .map(|u| u.id)
            .or(response.id)
            .ok_or_else(|| StorageError::Serialization("sign-up response without user id".into()))
    }

    async fn sign_in_with_password(
        &self,
        identifier: &str,
        password: &Password,
    ) -> Result<SignedIn, StorageError> {
        let request = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.config.anon_key)
            .json(&PasswordGrant {
                email: identifier,
                password: password.expose(),
            });
        let response: TokenResponse = self.fetch(request).await?;
        let token = AuthToken::parse(response.access_token).map_err(|e| {
            StorageError::Serialization(format!("access token: {e}"))
        })?;
        self.set_token(Some(token.clone()))?;
        Ok(SignedIn {
            user_id: response.user.id,
            token,
        })
    }

    async fn sign_out(&self, token: &AuthToken) -> Result<(), StorageError> {
        self.set_token(None)?;
        let request = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token.expose());
        self.send_empty(request).await
    }

    async fn current_user(&self, token: &AuthToken) -> Result<Option<UserId>, StorageError> {
        let request = self
            .client
            .get(self.auth_url("user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token.expose());
        match self.fetch::<AuthUser>(request).await {
            Ok(user) => {
                self.set_token(Some(token.clone()))?;
                Ok(Some(user.id))
            }
            Err(StorageError::PermissionDenied | StorageError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn verify_token(&self, token: &AuthToken) -> Result<bool, StorageError> {
        Ok(self.current_user(token).await?.is_some())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), StorageError> {
        let request = self.delete_user_request(user_id)?;
        self.send_empty(request).await
    }
}

// ─── Tables ───────────────────────────────────────────────────────────────────

#[async_trait]
impl ProfileRepository for RestBackend {
    async fn insert_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        self.insert_row(PROFILES, &ProfileRow::from_profile(profile))
            .await
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StorageError> {
        self.select_one::<ProfileRow>(PROFILES, &[("user_id", eq(user_id))])
            .await?
            .map(ProfileRow::into_profile)
            .transpose()
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, StorageError> {
        let row: ProfileRow = self
            .patch_row(PROFILES, ("user_id", eq(user_id)), &ProfilePatchBody::from(patch))
            .await?;
        row.into_profile()
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<UserProfile>, StorageError> {
        self.select_one::<ProfileRow>(
            PROFILES,
            &[("username", ilike_exact(username.as_str()))],
        )
        .await?
        .map(ProfileRow::into_profile)
        .transpose()
    }
}

#[async_trait]
impl ProgressRepository for RestBackend {
    async fn insert_progress(&self, progress: &UserProgress) -> Result<(), StorageError> {
        self.insert_row(PROGRESS, &ProgressRow::from_progress(progress))
            .await
    }

    async fn get_progress(&self, user_id: UserId) -> Result<Option<UserProgress>, StorageError> {
        self.select_one::<ProgressRow>(PROGRESS, &[("user_id", eq(user_id))])
            .await?
            .map(ProgressRow::into_progress)
            .transpose()
    }

    async fn update_progress(
        &self,
        user_id: UserId,
        patch: &ProgressPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<UserProgress, StorageError> {
        let row: ProgressRow = self
            .patch_row(
                PROGRESS,
                ("user_id", eq(user_id)),
                &ProgressPatchBody::new(patch, updated_at),
            )
            .await?;
        row.into_progress()
    }
}

#[async_trait]
impl ContentRepository for RestBackend {
    async fn list_words(&self, scope: &ContentScope) -> Result<Vec<Word>, StorageError> {
        let request = self
            .authed(self.client.get(self.table_url(WORDS)))?
            .query(&Self::scoped_query("*", scope));
        let rows: Vec<WordRow> = self.fetch(request).await?;
        rows.into_iter().map(WordRow::into_word).collect()
    }

    async fn list_books(&self, scope: &ContentScope) -> Result<Vec<Book>, StorageError> {
        let request = self
            .authed(self.client.get(self.table_url(BOOKS)))?
            .query(&Self::scoped_query("*,book_pages(*)", scope));
        let rows: Vec<BookRow> = self.fetch(request).await?;
        rows.into_iter().map(BookRow::into_book).collect()
    }

    /// The hosted badge table is global; the scope is not consulted.
    async fn list_badges(&self, _scope: &ContentScope) -> Result<Vec<Badge>, StorageError> {
        let request = self
            .authed(self.client.get(self.table_url(BADGES)))?
            .query(&[("select", "*"), ("order", "required_score.asc")]);
        let rows: Vec<BadgeRow> = self.fetch(request).await?;
        rows.into_iter().map(BadgeRow::into_badge).collect()
    }

    async fn add_word(&self, owner: UserId, draft: &WordDraft) -> Result<Word, StorageError> {
        draft
            .validate()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let request = self
            .authed(self.client.post(self.table_url(WORDS)))?
            .header("Prefer", "return=representation")
            .json(&NewWordRow::new(owner, draft));
        self.fetch::<Vec<WordRow>>(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Serialization("insert returned no word".into()))?
            .into_word()
    }
}

#[async_trait]
impl UserBadgeRepository for RestBackend {
    async fn list_unlocked(&self, user_id: UserId) -> Result<Vec<UnlockedBadge>, StorageError> {
        let request = self
            .authed(self.client.get(self.table_url(USER_BADGES)))?
            .query(&[
                ("select", "badge_id,unlocked_at".to_owned()),
                ("user_id", eq(user_id)),
                ("order", "unlocked_at.desc".to_owned()),
            ]);
        let rows: Vec<UserBadgeRow> = self.fetch(request).await?;
        Ok(rows.into_iter().map(UserBadgeRow::into_unlocked).collect())
    }

    async fn record_unlock(
        &self,
        user_id: UserId,
        badge_id: BadgeId,
        unlocked_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        match self
            .insert_row(USER_BADGES, &UserBadgeRow::new(user_id, badge_id, unlocked_at))
            .await
        {
            Err(StorageError::Conflict) => Ok(()),
            other => other,
        }
    }
}

impl Storage {
    /// Hosted backend for remote data, local `SQLite` for tokens and the progress cache.
    #[must_use]
    pub fn hosted(backend: RestBackend, local: SqliteRepository) -> Self {
        let backend = Arc::new(backend);
        let local = Arc::new(local);
        Self {
            identity: backend.clone(),
            profiles: backend.clone(),
            progress: backend.clone(),
            content: backend.clone(),
            user_badges: backend,
            tokens: local.clone(),
            progress_cache: local,
        }
    }
}
