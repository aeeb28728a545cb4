//! Settings database operations
//!
//! Key/value runtime overrides. A value stored here wins over the TOML
//! bootstrap value until it is deleted.

use leadflow_common::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Poller tick interval override
pub const POLL_INTERVAL_KEY: &str = "poll_interval_secs";

/// Poll interval: database override, else `default_secs`
pub async fn get_poll_interval_secs(db: &Pool<Sqlite>, default_secs: u64) -> Result<u64> {
    match get_setting::<u64>(db, POLL_INTERVAL_KEY).await? {
        Some(0) => {
            tracing::warn!("Ignoring {} = 0 in settings table", POLL_INTERVAL_KEY);
            Ok(default_secs)
        }
        Some(secs) => Ok(secs),
        None => Ok(default_secs),
    }
}

pub async fn set_poll_interval_secs(db: &Pool<Sqlite>, secs: u64) -> Result<()> {
    set_setting(db, POLL_INTERVAL_KEY, secs).await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
