use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Ordered schema steps; each version runs once, inside one transaction.
const MIGRATIONS: &[(i64, &[&str])] = &[
    (
        1,
        &[
            r"
            CREATE TABLE IF NOT EXISTS local_tokens (
                key TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                stored_at TEXT NOT NULL
            );
            ",
            r"
            CREATE TABLE IF NOT EXISTS progress_cache (
                user_id TEXT PRIMARY KEY,
                quiz_score INTEGER NOT NULL CHECK (quiz_score >= 0),
                quiz_streak INTEGER NOT NULL CHECK (quiz_streak >= 0),
                puzzle_completions INTEGER NOT NULL CHECK (puzzle_completions >= 0),
                words_learned INTEGER NOT NULL CHECK (words_learned >= 0),
                books_read INTEGER NOT NULL CHECK (books_read >= 0),
                updated_at TEXT NOT NULL
            );
            ",
        ],
    ),
];

/// Bring the device-local schema up to the latest version.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );
        ",
    )
    .execute(pool)
    .await?;

    for &(version, statements) in MIGRATIONS {
        let applied = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?
            .is_some();
        if applied {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)
             ON CONFLICT(version) DO NOTHING",
        )
        .bind(version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::debug!(version, "applied local schema migration");
    }

    Ok(())
}
