use learn_core::model::{ProgressCounters, UserId};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn counter_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} out of range: {v}")))
}

pub(crate) fn user_id_to_text(user_id: UserId) -> String {
    user_id.to_string()
}

pub(crate) fn map_counters_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ProgressCounters, StorageError> {
    let get = |field: &'static str| -> Result<u32, StorageError> {
        counter_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
    };
    Ok(ProgressCounters::from_persisted(
        get("quiz_score")?,
        get("quiz_streak")?,
        get("puzzle_completions")?,
        get("words_learned")?,
        get("books_read")?,
    ))
}
