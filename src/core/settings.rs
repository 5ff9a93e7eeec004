//! Board-wide settings kept in the `system_state` key/value table.
//!
//! Holds the display currency and the time the last reset pass finished.

use crate::{
    entities::{SystemState, system_state},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Set, prelude::*};

const CURRENCY_KEY: &str = "currency";
const LAST_PASS_KEY: &str = "last_cycle_pass";

/// Currency used when nothing has been configured.
pub const DEFAULT_CURRENCY: &str = "USD";

async fn get_value<C>(db: &C, key: &str) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    let state = SystemState::find()
        .filter(system_state::Column::Key.eq(key))
        .one(db)
        .await?;
    Ok(state.map(|s| s.value))
}

async fn set_value<C>(db: &C, key: &str, value: String) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now();

    let existing = SystemState::find()
        .filter(system_state::Column::Key.eq(key))
        .one(db)
        .await?;

    if let Some(state) = existing {
        let mut active_model: system_state::ActiveModel = state.into();
        active_model.value = Set(value);
        active_model.updated_at = Set(now);
        active_model.update(db).await?;
    } else {
        let new_state = system_state::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            updated_at: Set(now),
            ..Default::default()
        };
        new_state.insert(db).await?;
    }

    Ok(())
}

/// Normalizes and checks a currency code: three ASCII letters, upper-cased.
pub fn normalize_currency(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(Error::Validation {
            message: format!("Currency must be a three-letter code, got '{code}'"),
        });
    }
    Ok(code.to_ascii_uppercase())
}

/// Display currency, or `None` if never set.
pub async fn get_currency<C>(db: &C) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    get_value(db, CURRENCY_KEY).await
}

/// Display currency, falling back to [`DEFAULT_CURRENCY`].
pub async fn currency_or_default<C>(db: &C) -> Result<String>
where
    C: ConnectionTrait,
{
    Ok(get_currency(db)
        .await?
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()))
}

/// Stores a new display currency and returns the normalized code.
pub async fn set_currency<C>(db: &C, code: &str) -> Result<String>
where
    C: ConnectionTrait,
{
    let code = normalize_currency(code)?;
    set_value(db, CURRENCY_KEY, code.clone()).await?;
    Ok(code)
}

/// Seeds the currency at boot when none is stored yet.
pub async fn ensure_currency<C>(db: &C, fallback: &str) -> Result<String>
where
    C: ConnectionTrait,
{
    match get_currency(db).await? {
        Some(code) => Ok(code),
        None => set_currency(db, fallback).await,
    }
}

/// When the last reset pass finished, if one ever ran.
pub async fn get_last_pass_at<C>(db: &C) -> Result<Option<DateTime<Utc>>>
where
    C: ConnectionTrait,
{
    match get_value(db, LAST_PASS_KEY).await? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| Error::Config {
                message: format!("Failed to parse last pass timestamp: {e}"),
            }),
        None => Ok(None),
    }
}

/// Records when a reset pass finished.
pub async fn set_last_pass_at<C>(db: &C, at: DateTime<Utc>) -> Result<()>
where
    C: ConnectionTrait,
{
    set_value(db, LAST_PASS_KEY, at.to_rfc3339()).await
}
