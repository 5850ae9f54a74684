use course_core::model::{CourseId, NotificationId, PromoCodeId, UserId};
use serde::de::DeserializeOwned;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Map a driver error, surfacing unique-constraint violations as conflicts.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u8_from_i64(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(i64_to_u64("course_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn promo_id_from_i64(v: i64) -> Result<PromoCodeId, StorageError> {
    Ok(PromoCodeId::new(i64_to_u64("promo_code_id", v)?))
}

pub(crate) fn notification_id_from_i64(v: i64) -> Result<NotificationId, StorageError> {
    Ok(NotificationId::new(i64_to_u64("notification_id", v)?))
}

pub(crate) fn bool_to_i64(v: bool) -> i64 {
    i64::from(v)
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

/// Decode a JSON column strictly; NULL decodes to the default value.
pub(crate) fn from_json<T: DeserializeOwned + Default>(
    raw: Option<String>,
) -> Result<T, StorageError> {
    match raw {
        Some(raw) => serde_json::from_str(&raw).map_err(ser),
        None => Ok(T::default()),
    }
}

/// Decode a JSON column, falling back to the default on NULL or malformed data.
pub(crate) fn from_json_lenient<T: DeserializeOwned + Default>(
    column: &'static str,
    raw: Option<String>,
) -> T {
    match raw {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|error| {
            tracing::warn!(column, %error, "malformed json column, treating as empty");
            T::default()
        }),
        None => T::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_json_defaults_on_garbage() {
        let parsed: Vec<u64> = from_json_lenient("x", Some("{not json".into()));
        assert!(parsed.is_empty());
        let parsed: Vec<u64> = from_json_lenient("x", Some("[1,2]".into()));
        assert_eq!(parsed, vec![1, 2]);
    }

    #[test]
    fn strict_json_reports_garbage() {
        let parsed: Result<Vec<u64>, _> = from_json(Some("{not json".into()));
        assert!(matches!(parsed, Err(StorageError::Serialization(_))));
        let parsed: Vec<u64> = from_json(None).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn negative_ids_are_rejected() {
        assert!(course_id_from_i64(-1).is_err());
        assert_eq!(user_id_from_i64(7).unwrap(), UserId::new(7));
    }
}
