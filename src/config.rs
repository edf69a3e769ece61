//! Runtime configuration read from the environment.
//!
//! A `.env` file in the working directory is loaded first when present; real
//! environment variables take precedence over it.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::store::DeletePolicy;
use crate::utils::get_database_path;

pub const DB_VAR: &str = "MARGINALIA_DB";
pub const USER_VAR: &str = "MARGINALIA_USER";
pub const DELETE_POLICY_VAR: &str = "MARGINALIA_DELETE_POLICY";
pub const LOG_VAR: &str = "MARGINALIA_LOG";

const DEFAULT_LOG_FILTER: &str = "marginalia=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    /// Username acting as the current identity; anonymous when unset.
    pub username: Option<String>,
    pub delete_policy: DeletePolicy,
    pub log_filter: String,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error for unparseable values or when no default database
    /// location can be determined.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_path = match value(DB_VAR) {
            Some(path) => PathBuf::from(path),
            None => get_database_path()?,
        };

        let delete_policy = value(DELETE_POLICY_VAR)
            .map(|raw| raw.parse::<DeletePolicy>().map_err(anyhow::Error::msg))
            .transpose()
            .with_context(|| format!("Invalid {DELETE_POLICY_VAR}"))?
            .unwrap_or_default();

        Ok(Self {
            database_path,
            username: value(USER_VAR),
            delete_policy,
            log_filter: value(LOG_VAR).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serial_test::serial;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();

        assert!(config.database_path.ends_with("marginalia/marginalia.db"));
        assert_eq!(config.username, None);
        assert_eq!(config.delete_policy, DeletePolicy::Orphan);
        assert_eq!(config.log_filter, "marginalia=info");
    }

    #[test]
    fn explicit_values_win() {
        let config = config(&[
            (DB_VAR, "/tmp/m.db"),
            (USER_VAR, " ada "),
            (DELETE_POLICY_VAR, "cascade"),
            (LOG_VAR, "marginalia=debug"),
        ])
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/m.db"));
        assert_eq!(config.username.as_deref(), Some("ada"));
        assert_eq!(config.delete_policy, DeletePolicy::Cascade);
        assert_eq!(config.log_filter, "marginalia=debug");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config(&[(USER_VAR, "   ")]).unwrap();
        assert_eq!(config.username, None);
    }

    #[test]
    fn invalid_delete_policy_is_an_error() {
        let err = config(&[(DELETE_POLICY_VAR, "shred")]).unwrap_err();
        assert!(format!("{err:#}").contains("unknown delete policy"));
    }

    #[test]
    #[serial]
    fn reads_the_process_environment() {
        // SAFETY: serialised with every other test touching the environment.
        unsafe {
            std::env::set_var(USER_VAR, "from-env");
            std::env::set_var(DELETE_POLICY_VAR, "cascade");
        }

        let config = Config::from_env();

        unsafe {
            std::env::remove_var(USER_VAR);
            std::env::remove_var(DELETE_POLICY_VAR);
        }

        let config = config.unwrap();
        assert_eq!(config.username.as_deref(), Some("from-env"));
        assert_eq!(config.delete_policy, DeletePolicy::Cascade);
    }
}
