use std::sync::Arc;

use learn_core::{Clock, default_catalog};
use storage::repository::Storage;
use storage::{RestBackend, RestConfig, SqliteRepository};
use tracing::info;
use url::Url;

use crate::admin_auth::AdminAuthService;
use crate::config::BackendConfig;
use crate::content_service::ContentService;
use crate::error::{AppContextError, ContentServiceError};
use crate::progress_service::ProgressService;
use crate::session_manager::{SessionManager, SessionOptions, SessionState};

/// Every service the app needs, built once at startup and torn down with `dispose`.
#[derive(Clone)]
pub struct AppContext {
    sessions: Arc<SessionManager>,
    progress: Arc<ProgressService>,
    content: Arc<ContentService>,
    admin: Arc<AdminAuthService>,
    local: Option<SqliteRepository>,
}

impl AppContext {
    /// Open local storage, connect the hosted backend and try to restore the
    /// previous session.
    ///
    /// # Errors
    ///
    /// Returns `AppContextError` if local storage or the HTTP clients cannot be set up.
    pub async fn init(config: &BackendConfig, clock: Clock) -> Result<Self, AppContextError> {
        let local = SqliteRepository::open(&config.database_url).await?;
        let backend = RestBackend::new(RestConfig {
            base_url: config.backend_url.to_string(),
            anon_key: config.anon_key.clone(),
            service_key: Some(config.service_key.clone()),
            timeout: config.request_timeout,
        })?;
        let storage = Storage::hosted(backend, local.clone());

        let mut context = Self::with_storage(
            storage,
            clock,
            SessionOptions::from(config),
            config.admin_url.clone(),
        )?;
        context.local = Some(local);

        let state = context.sessions.verify_session().await;
        info!(
            authenticated = state.is_authenticated(),
            "app context initialized"
        );
        Ok(context)
    }

    /// Wire services over an existing storage bundle; no session restore is attempted.
    ///
    /// # Errors
    ///
    /// Returns `AppContextError::AdminAuth` if the admin HTTP client cannot be built.
    pub fn with_storage(
        storage: Storage,
        clock: Clock,
        options: SessionOptions,
        admin_url: Option<Url>,
    ) -> Result<Self, AppContextError> {
        let request_timeout = options.request_timeout;
        let sessions = Arc::new(SessionManager::new(storage.clone(), clock, options));
        let admin = AdminAuthService::new(admin_url, Arc::clone(&storage.tokens), request_timeout)?;
        let progress = Arc::new(ProgressService::new(
            Arc::clone(&sessions),
            default_catalog(),
        ));
        let content = Arc::new(ContentService::new(
            Arc::clone(&storage.content),
            Arc::clone(&sessions),
            request_timeout,
        ));
        Ok(Self {
            sessions,
            progress,
            content,
            admin: Arc::new(admin),
            local: None,
        })
    }

    /// Pull the stored badge catalog into the progress service.
    ///
    /// # Errors
    ///
    /// Returns `ContentServiceError` without a session or if the catalog cannot be fetched.
    pub async fn refresh_badges(&self) -> Result<(), ContentServiceError> {
        let badges = self.content.badges().await?;
        self.progress.replace_catalog(badges).await;
        Ok(())
    }

    pub async fn state(&self) -> SessionState {
        self.sessions.state().await
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn content(&self) -> Arc<ContentService> {
        Arc::clone(&self.content)
    }

    #[must_use]
    pub fn admin(&self) -> Arc<AdminAuthService> {
        Arc::clone(&self.admin)
    }

    /// Release local resources. The learner session stays persisted for the next start.
    pub async fn dispose(self) {
        if let Some(local) = self.local {
            local.close().await;
        }
        info!("app context disposed");
    }
}
