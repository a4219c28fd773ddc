#![forbid(unsafe_code)]

pub mod admin_auth;
pub mod app_context;
pub mod config;
pub mod content_service;
pub mod error;
pub mod messages;
pub mod progress_service;
pub mod retry;
pub mod session_manager;

pub use learn_core::Clock;

pub use admin_auth::AdminAuthService;
pub use app_context::AppContext;
pub use config::BackendConfig;
pub use content_service::ContentService;
pub use error::{
    AdminAuthError, AppContextError, ConfigError, ContentServiceError, SessionError,
    ValidationField,
};
pub use messages::{ErrorCode, Locale, message};
pub use progress_service::ProgressService;
pub use retry::RetryPolicy;
pub use session_manager::{SessionManager, SessionOptions, SessionState};
