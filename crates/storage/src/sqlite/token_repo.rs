use async_trait::async_trait;
use chrono::Utc;
use learn_core::model::AuthToken;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, ser};
use crate::repository::{StorageError, TokenStore};

#[async_trait]
impl TokenStore for SqliteRepository {
    async fn read_token(&self, key: &str) -> Result<Option<AuthToken>, StorageError> {
        let row = sqlx::query("SELECT token FROM local_tokens WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("token").map_err(ser)?;
        AuthToken::parse(raw).map(Some).map_err(ser)
    }

    async fn write_token(&self, key: &str, token: &AuthToken) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO local_tokens (key, token, stored_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                token = excluded.token,
                stored_at = excluded.stored_at
            ",
        )
        .bind(key)
        .bind(token.expose())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn clear_token(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM local_tokens WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
