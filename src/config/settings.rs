//! Process settings read from environment variables.
//!
//! `.env` is loaded by `main` before [`AppSettings::from_env`] runs, so values
//! can come from either place.

use crate::{
    config::database::DEFAULT_DATABASE_URL,
    core::settings::{DEFAULT_CURRENCY, normalize_currency},
    errors::{Error, Result},
};
use std::env::VarError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default address the HTTP server binds to.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Default interval between reset passes.
pub const DEFAULT_RESET_INTERVAL_SECS: u64 = 3600;

/// Runtime settings of the board.
#[derive(Clone, PartialEq, Eq)]
pub struct AppSettings {
    /// SeaORM connection URL
    pub database_url: String,
    /// Listen address of the HTTP server
    pub bind_addr: SocketAddr,
    /// Bearer token for admin routes; `None` leaves them open
    pub admin_token: Option<String>,
    /// Time between reset passes
    pub reset_interval: Duration,
    /// Roster file seeded at boot
    pub roster_path: PathBuf,
    /// Currency stored on first boot
    pub default_currency: String,
}

impl std::fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSettings")
            .field("database_url", &self.database_url)
            .field("bind_addr", &self.bind_addr)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("reset_interval", &self.reset_interval)
            .field("roster_path", &self.roster_path)
            .field("default_currency", &self.default_currency)
            .finish()
    }
}

impl AppSettings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key))
    }

    /// Reads settings through `lookup`, which behaves like [`std::env::var`].
    ///
    /// Unset keys fall back to their defaults; a value that is not valid
    /// Unicode is an error rather than being treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, VarError>,
    {
        let non_empty = |key: &str| -> Result<Option<String>> {
            match lookup(key) {
                Ok(value) => {
                    let value = value.trim();
                    Ok((!value.is_empty()).then(|| value.to_string()))
                }
                Err(VarError::NotPresent) => Ok(None),
                Err(e) => Err(e.into()),
            }
        };

        let database_url =
            non_empty("DATABASE_URL")?.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_raw =
            non_empty("BOARD_BIND_ADDR")?.unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|e| Error::Config {
            message: format!("BOARD_BIND_ADDR '{bind_raw}' is not a socket address: {e}"),
        })?;

        let reset_interval = match non_empty("BOARD_RESET_INTERVAL_SECS")? {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| Error::Config {
                    message: format!("BOARD_RESET_INTERVAL_SECS '{raw}' is not a number: {e}"),
                })?;
                if secs == 0 {
                    return Err(Error::Config {
                        message: "BOARD_RESET_INTERVAL_SECS must be at least 1".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_RESET_INTERVAL_SECS),
        };

        let default_currency = match non_empty("BOARD_CURRENCY")? {
            Some(raw) => normalize_currency(&raw).map_err(|e| Error::Config {
                message: format!("BOARD_CURRENCY: {e}"),
            })?,
            None => DEFAULT_CURRENCY.to_string(),
        };

        let roster_path =
            non_empty("BOARD_ROSTER_PATH")?.unwrap_or_else(|| "config.toml".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            admin_token: non_empty("BOARD_ADMIN_TOKEN")?,
            reset_interval,
            roster_path: PathBuf::from(roster_path),
            default_currency,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<AppSettings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppSettings::from_lookup(|key| env.get(key).cloned().ok_or(VarError::NotPresent))
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(settings.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(settings.admin_token, None);
        assert_eq!(settings.reset_interval, Duration::from_secs(3600));
        assert_eq!(settings.roster_path, PathBuf::from("config.toml"));
        assert_eq!(settings.default_currency, "USD");
    }

    #[test]
    fn test_overrides() {
        let settings = settings_from(&[
            ("BOARD_BIND_ADDR", "0.0.0.0:9000"),
            ("BOARD_ADMIN_TOKEN", "s3cret"),
            ("BOARD_RESET_INTERVAL_SECS", "60"),
            ("BOARD_CURRENCY", "eur"),
        ])
        .unwrap();
        assert_eq!(settings.bind_addr.port(), 9000);
        assert_eq!(settings.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(settings.reset_interval, Duration::from_secs(60));
        assert_eq!(settings.default_currency, "EUR");
        assert!(!format!("{settings:?}").contains("s3cret"));
    }

    #[test]
    fn test_blank_token_means_open_access() {
        let settings = settings_from(&[("BOARD_ADMIN_TOKEN", "   ")]).unwrap();
        assert_eq!(settings.admin_token, None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            settings_from(&[("BOARD_BIND_ADDR", "nowhere")]),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            settings_from(&[("BOARD_RESET_INTERVAL_SECS", "0")]),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            settings_from(&[("BOARD_CURRENCY", "dollars")]),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_non_unicode_value_is_reported() {
        let result = AppSettings::from_lookup(|key| {
            if key == "BOARD_ADMIN_TOKEN" {
                Err(VarError::NotUnicode(std::ffi::OsString::from("token")))
            } else {
                Err(VarError::NotPresent)
            }
        });
        assert!(matches!(result, Err(Error::EnvVar(VarError::NotUnicode(_)))));
    }
}
