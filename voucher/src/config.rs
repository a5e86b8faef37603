//! Configuration management for the voucher application.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unlike a missing variable, a present but unparseable one is an error.

use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which ledger implementation backs the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    /// Remote HTTP ledger
    Http,
    /// In-process ledger, for local runs
    Memory,
}

impl FromStr for LedgerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "memory" => Ok(Self::Memory),
            _ => Err("expected `http` or `memory`".to_string()),
        }
    }
}

/// What the issuance controller does when the device is already bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingPolicy {
    /// Go straight to the bound ticket without contacting the ledger
    #[default]
    TrustCache,
    /// Confirm the bound ticket with the ledger before showing it
    Revalidate,
}

impl FromStr for BindingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trust-cache" => Ok(Self::TrustCache),
            "revalidate" => Ok(Self::Revalidate),
            _ => Err("expected `trust-cache` or `revalidate`".to_string()),
        }
    }
}

/// Ledger connection settings
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Backend selection
    pub backend: LedgerBackend,
    /// Endpoint of the HTTP ledger; required for [`LedgerBackend::Http`]
    pub url: Option<String>,
    /// Campaign tag sent with `issue`
    pub source: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Settings shared by all controllers
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Fast-path decision for bound devices
    pub binding_policy: BindingPolicy,
    /// Delay before a finished redemption returns to the ticket view
    pub return_delay: Duration,
    /// Origin the scannable code points at
    pub public_origin: String,
    /// Route prefix
    pub base_path: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            binding_policy: BindingPolicy::TrustCache,
            return_delay: Duration::from_millis(DEFAULT_RETURN_DELAY_MS),
            public_origin: DEFAULT_PUBLIC_ORIGIN.to_string(),
            base_path: DEFAULT_BASE_PATH.to_string(),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ledger connection
    pub ledger: LedgerConfig,
    /// Controller behavior
    pub controllers: ControllerSettings,
    /// Directory holding the device binding record
    pub data_dir: PathBuf,
    /// Enables the destructive binding reset
    pub diagnostics: bool,
}

const DEFAULT_SOURCE: &str = "kuangsan_2025";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PUBLIC_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_BASE_PATH: &str = "/kuangsan-ticket";
const DEFAULT_DATA_DIR: &str = ".voucher";
const DEFAULT_RETURN_DELAY_MS: u64 = 5000;

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is present but invalid, or if the
    /// HTTP backend is selected without `VOUCHER_LEDGER_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = parse_or(&var, "VOUCHER_LEDGER_BACKEND", LedgerBackend::Http)?;
        let url = var("VOUCHER_LEDGER_URL");
        if backend == LedgerBackend::Http && url.is_none() {
            return Err(ConfigError::Missing("VOUCHER_LEDGER_URL"));
        }

        let timeout_secs: u64 = parse_or(&var, "VOUCHER_LEDGER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let return_delay_ms: u64 = parse_or(&var, "VOUCHER_RETURN_DELAY_MS", DEFAULT_RETURN_DELAY_MS)?;

        let base_path = var("VOUCHER_BASE_PATH").unwrap_or_else(|| DEFAULT_BASE_PATH.to_string());
        if !base_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "VOUCHER_BASE_PATH",
                value: base_path,
                reason: "must start with `/`".to_string(),
            });
        }

        Ok(Self {
            ledger: LedgerConfig {
                backend,
                url,
                source: var("VOUCHER_LEDGER_SOURCE").unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
                timeout: Duration::from_secs(timeout_secs),
            },
            controllers: ControllerSettings {
                binding_policy: parse_or(&var, "VOUCHER_BINDING_POLICY", BindingPolicy::TrustCache)?,
                return_delay: Duration::from_millis(return_delay_ms),
                public_origin: var("VOUCHER_PUBLIC_ORIGIN")
                    .unwrap_or_else(|| DEFAULT_PUBLIC_ORIGIN.to_string()),
                base_path,
            },
            data_dir: var("VOUCHER_DATA_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            diagnostics: parse_or(&var, "VOUCHER_DIAGNOSTICS", false)?,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_memory_backend() {
        let config = load(&[("VOUCHER_LEDGER_BACKEND", "memory")]).unwrap();

        assert_eq!(config.ledger.backend, LedgerBackend::Memory);
        assert_eq!(config.ledger.source, "kuangsan_2025");
        assert_eq!(config.ledger.timeout, Duration::from_secs(15));
        assert_eq!(config.controllers.binding_policy, BindingPolicy::TrustCache);
        assert_eq!(config.controllers.return_delay, Duration::from_millis(5000));
        assert_eq!(config.controllers.base_path, "/kuangsan-ticket");
        assert_eq!(config.data_dir, PathBuf::from(".voucher"));
        assert!(!config.diagnostics);
    }

    #[test]
    fn http_backend_requires_url() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("VOUCHER_LEDGER_URL"))));

        let config = load(&[("VOUCHER_LEDGER_URL", "https://ledger.example/exec")]).unwrap();
        assert_eq!(config.ledger.backend, LedgerBackend::Http);
        assert_eq!(config.ledger.url.as_deref(), Some("https://ledger.example/exec"));
    }

    #[test]
    fn invalid_values_are_rejected_not_defaulted() {
        let err = load(&[
            ("VOUCHER_LEDGER_BACKEND", "memory"),
            ("VOUCHER_RETURN_DELAY_MS", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "VOUCHER_RETURN_DELAY_MS", .. }));

        let err = load(&[
            ("VOUCHER_LEDGER_BACKEND", "memory"),
            ("VOUCHER_BINDING_POLICY", "sometimes"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "VOUCHER_BINDING_POLICY", .. }));

        let err = load(&[("VOUCHER_LEDGER_BACKEND", "carrier-pigeon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "VOUCHER_LEDGER_BACKEND", .. }));
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("VOUCHER_LEDGER_BACKEND", "memory"),
            ("VOUCHER_BINDING_POLICY", "revalidate"),
            ("VOUCHER_RETURN_DELAY_MS", "1200"),
            ("VOUCHER_DIAGNOSTICS", "true"),
            ("VOUCHER_BASE_PATH", "/promo"),
        ])
        .unwrap();

        assert_eq!(config.controllers.binding_policy, BindingPolicy::Revalidate);
        assert_eq!(config.controllers.return_delay, Duration::from_millis(1200));
        assert_eq!(config.controllers.base_path, "/promo");
        assert!(config.diagnostics);
    }

    #[test]
    fn base_path_must_be_absolute() {
        let err = load(&[("VOUCHER_LEDGER_BACKEND", "memory"), ("VOUCHER_BASE_PATH", "promo")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "VOUCHER_BASE_PATH", .. }));
    }
}
