use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use learn_core::default_catalog;
use learn_core::model::{Badge, Book, ContentScope, Word, WordDraft, words_by_category};
use storage::repository::ContentRepository;
use tracing::{debug, info};

use crate::error::ContentServiceError;
use crate::retry::with_timeout;
use crate::session_manager::SessionManager;

/// Catalog queries scoped to the signed-in learner, plus the learner's own words.
#[derive(Clone)]
pub struct ContentService {
    content: Arc<dyn ContentRepository>,
    sessions: Arc<SessionManager>,
    request_timeout: Duration,
}

impl ContentService {
    #[must_use]
    pub fn new(
        content: Arc<dyn ContentRepository>,
        sessions: Arc<SessionManager>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            content,
            sessions,
            request_timeout,
        }
    }

    async fn scope(&self) -> Result<ContentScope, ContentServiceError> {
        let session = self
            .sessions
            .session()
            .await
            .ok_or(ContentServiceError::NotAuthenticated)?;
        Ok(ContentScope {
            user: session.user_id(),
            child_age: session.profile().child_age(),
        })
    }

    /// Global words plus the learner's own, for the learner's age.
    ///
    /// # Errors
    ///
    /// Returns `ContentServiceError::NotAuthenticated` without a session, or a storage error.
    pub async fn words(&self) -> Result<Vec<Word>, ContentServiceError> {
        let scope = self.scope().await?;
        let mut words = with_timeout(self.request_timeout, self.content.list_words(&scope)).await?;
        words.retain(|word| scope.admits(word.owner(), word.ages()));
        Ok(words)
    }

    /// Add a word to the learner's own collection.
    ///
    /// # Errors
    ///
    /// Returns `ContentServiceError::NotAuthenticated` without a session,
    /// `ContentServiceError::InvalidWord` for a draft with a blank field (no
    /// network call is made), or a storage error.
    pub async fn add_word(&self, draft: WordDraft) -> Result<Word, ContentServiceError> {
        let scope = self.scope().await?;
        draft.validate()?;
        let word =
            with_timeout(self.request_timeout, self.content.add_word(scope.user, &draft)).await?;
        info!(word_id = %word.id(), category = word.category(), "word added");
        Ok(word)
    }

    /// # Errors
    ///
    /// Same as [`ContentService::words`].
    pub async fn words_by_category(
        &self,
    ) -> Result<BTreeMap<String, Vec<Word>>, ContentServiceError> {
        Ok(words_by_category(&self.words().await?))
    }

    /// # Errors
    ///
    /// Returns `ContentServiceError::NotAuthenticated` without a session, or a storage error.
    pub async fn books(&self) -> Result<Vec<Book>, ContentServiceError> {
        let scope = self.scope().await?;
        let mut books = with_timeout(self.request_timeout, self.content.list_books(&scope)).await?;
        books.retain(|book| scope.admits(book.owner(), book.ages()));
        Ok(books)
    }

    /// Badge definitions from the store, or the built-in catalog when the store has none.
    ///
    /// # Errors
    ///
    /// Returns `ContentServiceError::NotAuthenticated` without a session, or a storage error.
    pub async fn badges(&self) -> Result<Vec<Badge>, ContentServiceError> {
        let scope = self.scope().await?;
        let badges = with_timeout(self.request_timeout, self.content.list_badges(&scope)).await?;
        if badges.is_empty() {
            debug!("no stored badges, using built-in catalog");
            return Ok(default_catalog());
        }
        Ok(badges)
    }
}
