use async_trait::async_trait;
use learn_core::model::{ProgressCounters, UserId, UserProgress};

use super::SqliteRepository;
use super::mapping::{conn, map_counters_row, user_id_to_text};
use crate::repository::{ProgressCache, StorageError};

#[async_trait]
impl ProgressCache for SqliteRepository {
    async fn load_cached(&self, user_id: UserId) -> Result<Option<ProgressCounters>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT quiz_score, quiz_streak, puzzle_completions, words_learned, books_read
            FROM progress_cache
            WHERE user_id = ?1
            ",
        )
        .bind(user_id_to_text(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_counters_row).transpose()
    }

    async fn store_cached(&self, progress: &UserProgress) -> Result<(), StorageError> {
        let counters = progress.counters();
        sqlx::query(
            r"
            INSERT INTO progress_cache (
                user_id, quiz_score, quiz_streak, puzzle_completions,
                words_learned, books_read, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id) DO UPDATE SET
                quiz_score = excluded.quiz_score,
                quiz_streak = excluded.quiz_streak,
                puzzle_completions = excluded.puzzle_completions,
                words_learned = excluded.words_learned,
                books_read = excluded.books_read,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user_id_to_text(progress.user_id()))
        .bind(i64::from(counters.quiz_score()))
        .bind(i64::from(counters.quiz_streak()))
        .bind(i64::from(counters.puzzle_completions()))
        .bind(i64::from(counters.words_learned()))
        .bind(i64::from(counters.books_read()))
        .bind(progress.updated_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn clear_cached(&self, user_id: UserId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM progress_cache WHERE user_id = ?1")
            .bind(user_id_to_text(user_id))
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
